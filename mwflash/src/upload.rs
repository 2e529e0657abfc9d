//! Byte-streaming upload driver.
//!
//! One driver covers both traversal orders. For each image byte it encodes a
//! `mw.b` command, writes it to the transport, lets the pacer block, then
//! updates the progress reporter.
//!
//! ```text
//!  NotStarted ──run──▶ Running ──▶ Completed
//!                         │
//!                         └──────▶ Aborted (write failure / cancelled)
//! ```
//!
//! Commands are fire-and-forget: the bootloader's echo is never read, so a
//! byte lost on the wire goes unnoticed. A failed write aborts the run; there
//! is no resume and a re-run starts from the first byte of the traversal.

use {
    crate::{
        command::ByteCommand,
        error::{Error, Result},
        image::FirmwareImage,
        pacer::Pacer,
        plan::UploadPlan,
        progress::{ProgressReporter, StatusSink},
    },
    log::{debug, trace, warn},
    std::{
        io::Write,
        time::{Duration, Instant},
    },
};

/// Lifecycle of an [`UploadDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadState {
    /// `run` has not been called.
    #[default]
    NotStarted,
    /// Commands are being sent.
    Running,
    /// Every byte was sent.
    Completed,
    /// The run stopped early.
    Aborted(AbortReason),
}

/// Why a run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The transport rejected a write.
    WriteFailed,
    /// Cancellation was requested between two commands.
    Cancelled,
    /// The plan did not match the image or the reporter.
    InvalidPlan,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadSummary {
    /// Commands sent.
    pub bytes_sent: usize,
    /// Wall-clock time from the first command to the final flush.
    pub duration: Duration,
}

impl UploadSummary {
    /// Average throughput in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives one upload run.
pub struct UploadDriver<P> {
    plan: UploadPlan,
    pacer: P,
    state: UploadState,
    cancel: Box<dyn Fn() -> bool>,
}

impl<P: Pacer> UploadDriver<P> {
    /// Create a driver for `plan`.
    ///
    /// Cancellation defaults to [`crate::is_interrupted_requested`].
    pub fn new(plan: UploadPlan, pacer: P) -> Self {
        Self {
            plan,
            pacer,
            state: UploadState::NotStarted,
            cancel: Box::new(crate::is_interrupted_requested),
        }
    }

    /// Replace the cancellation check, polled once before every command.
    #[must_use]
    pub fn with_cancel_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.cancel = Box::new(check);
        self
    }

    /// The plan this driver executes.
    pub fn plan(&self) -> &UploadPlan {
        &self.plan
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Send every byte of `image` to `transport`.
    ///
    /// The first error aborts the run and no further command is written.
    pub fn run<W, S>(
        &mut self,
        image: &FirmwareImage,
        transport: &mut W,
        reporter: &mut ProgressReporter<S>,
    ) -> Result<UploadSummary>
    where
        W: Write + ?Sized,
        S: StatusSink,
    {
        let expected = self.plan.length();
        let mismatch = if image.len() != expected {
            Some(format!(
                "plan covers {expected} bytes but the image has {}",
                image.len()
            ))
        } else if reporter.total() != expected {
            Some(format!(
                "plan covers {expected} bytes but the progress reporter expects {}",
                reporter.total()
            ))
        } else {
            None
        };
        if let Some(reason) = mismatch {
            self.state = UploadState::Aborted(AbortReason::InvalidPlan);
            return Err(Error::InvalidPlan(reason));
        }

        debug!(
            "Starting {} upload: {} bytes at {:#010x}, delay {:?}",
            self.plan.order(),
            self.plan.length(),
            self.plan.base_address(),
            self.plan.inter_command_delay()
        );

        self.state = UploadState::Running;
        let start = Instant::now();
        reporter.restart_at(start);

        let result = self.send_all(image, transport, reporter);
        match result {
            Ok(bytes_sent) => {
                let summary = UploadSummary {
                    bytes_sent,
                    duration: start.elapsed(),
                };
                self.state = UploadState::Completed;
                debug!(
                    "Upload complete: {} bytes in {:?} ({:.1} B/s)",
                    summary.bytes_sent,
                    summary.duration,
                    summary.bytes_per_second()
                );
                Ok(summary)
            },
            Err(e) => {
                let reason = if e.is_cancelled() {
                    AbortReason::Cancelled
                } else {
                    AbortReason::WriteFailed
                };
                warn!("Upload aborted: {e}");
                self.state = UploadState::Aborted(reason);
                Err(e)
            },
        }
    }

    fn send_all<W, S>(
        &mut self,
        image: &FirmwareImage,
        transport: &mut W,
        reporter: &mut ProgressReporter<S>,
    ) -> Result<usize>
    where
        W: Write + ?Sized,
        S: StatusSink,
    {
        let data = image.as_bytes();
        let mut processed = 0;

        for index in self.plan.order().indices(data.len()) {
            if (self.cancel)() {
                debug!("Cancellation requested after {processed} commands");
                return Err(Error::Cancelled);
            }

            let address = self.plan.address_of(index);
            let value = data[index];
            let cmd = ByteCommand::new(address, value);
            trace!("{cmd}");

            transport
                .write_all(&cmd.to_bytes())
                .map_err(|source| Error::TransportWrite { address, source })?;

            self.pacer.wait();
            reporter.update(processed, address, value);
            processed += 1;
        }

        transport.flush().map_err(Error::TransportFlush)?;

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            command::tests::parse_stream,
            plan::TraversalOrder,
            progress::{NullSink, ProgressSnapshot},
        },
        std::{
            cell::Cell,
            io,
            rc::Rc,
        },
    };

    /// Pacer that only counts calls.
    #[derive(Default)]
    struct CountingPacer {
        waits: usize,
    }

    impl Pacer for CountingPacer {
        fn wait(&mut self) {
            self.waits += 1;
        }
    }

    /// Transport that accepts `fail_at` writes and rejects every write after.
    struct FailingTransport {
        written: Vec<u8>,
        writes: usize,
        attempts_after_failure: usize,
        fail_at: usize,
    }

    impl FailingTransport {
        fn new(fail_at: usize) -> Self {
            Self {
                written: Vec::new(),
                writes: 0,
                attempts_after_failure: 0,
                fail_at,
            }
        }
    }

    impl Write for FailingTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes >= self.fail_at {
                if self.writes > self.fail_at {
                    self.attempts_after_failure += 1;
                }
                self.writes += 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
            }
            self.writes += 1;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn plan_for(image: &FirmwareImage, base: u32, order: TraversalOrder) -> UploadPlan {
        UploadPlan::new(base, image.len(), order, Duration::ZERO).unwrap()
    }

    fn upload(image: &FirmwareImage, base: u32, order: TraversalOrder) -> (Vec<u8>, UploadSummary) {
        let mut driver = UploadDriver::new(plan_for(image, base, order), CountingPacer::default())
            .with_cancel_check(|| false);
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(image.len(), NullSink);
        let summary = driver.run(image, &mut out, &mut reporter).unwrap();
        assert_eq!(driver.state(), UploadState::Completed);
        (out, summary)
    }

    fn sample_image(len: usize) -> FirmwareImage {
        FirmwareImage::from_bytes((0..len).map(|i| (i * 7 + 3) as u8).collect::<Vec<_>>())
    }

    #[test]
    fn test_ascending_stream() {
        let image = FirmwareImage::from_bytes(vec![0x27, 0x05, 0x19]);
        let (out, summary) = upload(&image, 0x4400_0000, TraversalOrder::Ascending);

        assert_eq!(
            out,
            b"mw.b 0x44000000 0x27\nmw.b 0x44000001 0x05\nmw.b 0x44000002 0x19\n".to_vec()
        );
        assert_eq!(summary.bytes_sent, 3);
    }

    #[test]
    fn test_descending_stream() {
        let image = FirmwareImage::from_bytes(vec![0x27, 0x05, 0x19]);
        let (out, _) = upload(&image, 0x4400_0000, TraversalOrder::Descending);

        assert_eq!(
            out,
            b"mw.b 0x44000002 0x19\nmw.b 0x44000001 0x05\nmw.b 0x44000000 0x27\n".to_vec()
        );
    }

    #[test]
    fn test_round_trip_both_orders() {
        let image = sample_image(1024);
        for order in [TraversalOrder::Ascending, TraversalOrder::Descending] {
            let base = 0x4400_0000;
            let (out, _) = upload(&image, base, order);
            let commands = parse_stream(&out);
            assert_eq!(commands.len(), image.len());

            let mut rebuilt = vec![None; image.len()];
            for ByteCommand { address, value } in commands {
                let slot = &mut rebuilt[(address - base) as usize];
                assert!(slot.is_none(), "address {address:#x} sent twice");
                *slot = Some(value);
            }
            let rebuilt: Vec<u8> = rebuilt.into_iter().map(Option::unwrap).collect();
            assert_eq!(rebuilt, image.as_bytes(), "{order} round trip");
        }
    }

    #[test]
    fn test_address_sets_equal_orders_differ() {
        let image = sample_image(257);
        let asc: Vec<u32> = parse_stream(&upload(&image, 0x1000, TraversalOrder::Ascending).0)
            .iter()
            .map(|c| c.address)
            .collect();
        let desc: Vec<u32> = parse_stream(&upload(&image, 0x1000, TraversalOrder::Descending).0)
            .iter()
            .map(|c| c.address)
            .collect();

        assert!(asc.windows(2).all(|w| w[1] == w[0] + 1));
        assert!(desc.windows(2).all(|w| w[1] + 1 == w[0]));
        assert_eq!(asc.first(), Some(&0x1000));
        assert_eq!(asc.last(), Some(&0x1100));
        let mut reversed = desc.clone();
        reversed.reverse();
        assert_eq!(asc, reversed);
    }

    #[test]
    fn test_pacer_called_once_per_command() {
        let image = sample_image(42);
        let mut driver = UploadDriver::new(
            plan_for(&image, 0, TraversalOrder::Descending),
            CountingPacer::default(),
        )
        .with_cancel_check(|| false);
        let mut reporter = ProgressReporter::new(image.len(), NullSink);
        driver.run(&image, &mut io::sink(), &mut reporter).unwrap();
        assert_eq!(driver.pacer.waits, 42);
    }

    #[test]
    fn test_write_failure_aborts_and_stops_writing() {
        let image = sample_image(100);
        for k in [1, 37, 99] {
            let mut transport = FailingTransport::new(k);
            let mut driver = UploadDriver::new(
                plan_for(&image, 0x4400_0000, TraversalOrder::Ascending),
                CountingPacer::default(),
            )
            .with_cancel_check(|| false);
            let mut reporter = ProgressReporter::new(image.len(), NullSink);

            let err = driver
                .run(&image, &mut transport, &mut reporter)
                .unwrap_err();

            match err {
                Error::TransportWrite { address, .. } => {
                    assert_eq!(address, 0x4400_0000 + k as u32);
                },
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(driver.state(), UploadState::Aborted(AbortReason::WriteFailed));
            assert_eq!(transport.writes, k + 1);
            assert_eq!(transport.attempts_after_failure, 0);
            assert_eq!(parse_stream(&transport.written).len(), k);
            assert_eq!(driver.pacer.waits, k);
        }
    }

    #[test]
    fn test_cancel_between_commands() {
        let image = sample_image(50);
        let polls = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&polls);
        let mut driver = UploadDriver::new(
            plan_for(&image, 0, TraversalOrder::Ascending),
            CountingPacer::default(),
        )
        .with_cancel_check(move || {
            counter.set(counter.get() + 1);
            counter.get() > 10
        });
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(image.len(), NullSink);

        let err = driver.run(&image, &mut out, &mut reporter).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(driver.state(), UploadState::Aborted(AbortReason::Cancelled));
        assert_eq!(parse_stream(&out).len(), 10);
        assert_eq!(polls.get(), 11);
    }

    #[test]
    fn test_plan_length_mismatch_rejected() {
        let image = sample_image(10);
        let plan = UploadPlan::new(0, 11, TraversalOrder::Ascending, Duration::ZERO).unwrap();
        let mut driver = UploadDriver::new(plan, CountingPacer::default()).with_cancel_check(|| false);
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(11, NullSink);

        assert!(matches!(
            driver.run(&image, &mut out, &mut reporter),
            Err(Error::InvalidPlan(_))
        ));
        assert!(out.is_empty());
        assert_eq!(driver.state(), UploadState::Aborted(AbortReason::InvalidPlan));
    }

    #[test]
    fn test_reporter_total_mismatch_rejected() {
        let image = sample_image(5);
        let mut driver = UploadDriver::new(
            plan_for(&image, 0, TraversalOrder::Ascending),
            CountingPacer::default(),
        )
        .with_cancel_check(|| false);
        let mut out = Vec::new();
        let mut lines: Vec<String> = Vec::new();
        let mut reporter =
            ProgressReporter::new(7, |_: &ProgressSnapshot, line: &str| lines.push(line.to_string()));

        let err = driver.run(&image, &mut out, &mut reporter).unwrap_err();

        match err {
            Error::InvalidPlan(msg) => assert!(msg.contains("expects 7"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(out.is_empty());
        assert_eq!(driver.state(), UploadState::Aborted(AbortReason::InvalidPlan));
        drop(reporter);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_final_line_reports_full_total() {
        let image = sample_image(5);
        let mut driver = UploadDriver::new(
            plan_for(&image, 0, TraversalOrder::Ascending),
            CountingPacer::default(),
        )
        .with_cancel_check(|| false);
        let mut lines: Vec<String> = Vec::new();
        {
            let mut reporter = ProgressReporter::new(image.len(), |_: &ProgressSnapshot, line: &str| {
                lines.push(line.to_string());
            });
            driver.run(&image, &mut io::sink(), &mut reporter).unwrap();
        }

        let last = lines.last().expect("final status line");
        assert!(last.starts_with("[      5/5] 100.00%"), "{last}");
        assert!(last.ends_with("Addr: 0x00000004 | Byte: 0x1f"), "{last}");
    }

    /// Transport whose writes succeed and whose flush fails.
    struct FlushFailingTransport;

    impl Write for FlushFailingTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "flush timed out"))
        }
    }

    #[test]
    fn test_flush_failure_on_empty_image_has_no_address() {
        let image = FirmwareImage::from_bytes(Vec::new());
        let mut driver = UploadDriver::new(
            plan_for(&image, 0x4400_0000, TraversalOrder::Ascending),
            CountingPacer::default(),
        )
        .with_cancel_check(|| false);
        let mut reporter = ProgressReporter::new(0, NullSink);

        let err = driver
            .run(&image, &mut FlushFailingTransport, &mut reporter)
            .unwrap_err();

        assert!(matches!(err, Error::TransportFlush(_)), "{err:?}");
        assert!(!err.to_string().contains("0x44000000"));
        assert_eq!(driver.state(), UploadState::Aborted(AbortReason::WriteFailed));
    }

    #[test]
    fn test_reporter_sees_traversal_positions() {
        let image = sample_image(25_000);
        let mut seen: Vec<(usize, u32)> = Vec::new();
        {
            let mut reporter = ProgressReporter::new(
                image.len(),
                |s: &ProgressSnapshot, _: &str| seen.push((s.processed_count, s.current_address)),
            );
            let mut driver = UploadDriver::new(
                plan_for(&image, 0x4400_0000, TraversalOrder::Descending),
                CountingPacer::default(),
            )
            .with_cancel_check(|| false);
            driver.run(&image, &mut io::sink(), &mut reporter).unwrap();
        }

        // Count-based triggers and the final item; a slow machine may add
        // time-based lines in between.
        let positions: Vec<usize> = seen.iter().map(|(p, _)| *p).collect();
        for expected in [0, 10_000, 20_000, 24_999] {
            assert!(positions.contains(&expected), "missing {expected}");
        }
        assert_eq!(seen.first(), Some(&(0, 0x4400_0000 + 24_999)));
        assert_eq!(seen.last(), Some(&(24_999, 0x4400_0000)));
    }

    #[test]
    fn test_empty_image_completes() {
        let image = FirmwareImage::from_bytes(Vec::new());
        let (out, summary) = upload(&image, 0x4400_0000, TraversalOrder::Descending);
        assert!(out.is_empty());
        assert_eq!(summary.bytes_sent, 0);
    }

    #[test]
    fn test_throughput_matches_length_over_duration() {
        let image = sample_image(20);
        let plan = UploadPlan::new(0, image.len(), TraversalOrder::Ascending, Duration::from_millis(2))
            .unwrap();
        let mut driver = UploadDriver::new(plan, crate::pacer::FixedDelay::new(plan.inter_command_delay()))
            .with_cancel_check(|| false);
        let mut reporter = ProgressReporter::new(image.len(), NullSink);
        let summary = driver.run(&image, &mut io::sink(), &mut reporter).unwrap();

        assert!(summary.duration >= Duration::from_millis(40));
        let expected = 20.0 / summary.duration.as_secs_f64();
        assert!((summary.bytes_per_second() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_summary_zero_duration_rate() {
        let summary = UploadSummary {
            bytes_sent: 0,
            duration: Duration::ZERO,
        };
        assert!(summary.bytes_per_second().abs() < f64::EPSILON);
    }
}
