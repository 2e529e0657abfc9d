//! Upload progress: emission cadence, rate/ETA math, and the status line.
//!
//! A status line is emitted when the traversal position is a multiple of
//! [`EMIT_EVERY`], when [`EMIT_INTERVAL`] has passed since the previous line,
//! or on the last item. The count trigger keeps fast links quiet, the timer
//! keeps slow links alive, and the last-item trigger guarantees a final line.

use std::time::{Duration, Instant};

/// Emit a line every this many commands.
pub const EMIT_EVERY: usize = 10_000;

/// Emit a line at least this often.
pub const EMIT_INTERVAL: Duration = Duration::from_secs(10);

/// Whether a status line is due.
///
/// `processed` is the zero-based position in the traversal (commands
/// completed before the current one), regardless of direction.
pub fn should_emit(processed: usize, last_emit: Instant, now: Instant, is_last: bool) -> bool {
    processed % EMIT_EVERY == 0
        || now.saturating_duration_since(last_emit) >= EMIT_INTERVAL
        || is_last
}

/// Point-in-time view of an upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Commands completed before the current one.
    pub processed_count: usize,
    /// Total commands in the run.
    pub total_count: usize,
    /// Time since the run started.
    pub elapsed: Duration,
    /// Address of the current command.
    pub current_address: u32,
    /// Value of the current command.
    pub current_byte: u8,
}

impl ProgressSnapshot {
    /// Commands sent including the current one.
    pub fn sent(&self) -> usize {
        (self.processed_count + 1).min(self.total_count)
    }

    /// Percentage of commands sent.
    pub fn percent(&self) -> f64 {
        if self.total_count == 0 {
            return 100.0;
        }
        self.sent() as f64 / self.total_count as f64 * 100.0
    }

    /// Commands per second, or `None` until there is something to measure.
    pub fn rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if self.processed_count == 0 || secs <= 0.0 {
            return None;
        }
        Some(self.processed_count as f64 / secs)
    }

    /// Estimated time to completion at the current rate.
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.rate()?;
        let remaining = self.total_count.saturating_sub(self.processed_count);
        Duration::try_from_secs_f64(remaining as f64 / rate).ok()
    }
}

/// Format a duration as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Render the single-line status for `snapshot`.
pub fn render(snapshot: &ProgressSnapshot) -> String {
    let eta = snapshot
        .eta()
        .map_or_else(|| "calculating...".to_string(), format_hms);
    format!(
        "[{:>7}/{}] {:6.2}% | Elapsed: {} | ETA: {} | Addr: 0x{:08x} | Byte: 0x{:02x}",
        snapshot.sent(),
        snapshot.total_count,
        snapshot.percent(),
        format_hms(snapshot.elapsed),
        eta,
        snapshot.current_address,
        snapshot.current_byte
    )
}

/// Destination for rendered status lines.
pub trait StatusSink {
    /// Called for every emitted line.
    fn status(&mut self, snapshot: &ProgressSnapshot, line: &str);
}

impl<F> StatusSink for F
where
    F: FnMut(&ProgressSnapshot, &str),
{
    fn status(&mut self, snapshot: &ProgressSnapshot, line: &str) {
        self(snapshot, line);
    }
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn status(&mut self, _snapshot: &ProgressSnapshot, _line: &str) {}
}

/// Applies the emission policy and forwards rendered lines to a sink.
pub struct ProgressReporter<S> {
    total: usize,
    start: Instant,
    last_emit: Instant,
    emitted: usize,
    sink: S,
}

impl<S: StatusSink> ProgressReporter<S> {
    /// Create a reporter for `total` commands. The clock starts now.
    pub fn new(total: usize, sink: S) -> Self {
        let now = Instant::now();
        Self {
            total,
            start: now,
            last_emit: now,
            emitted: 0,
            sink,
        }
    }

    /// Reset the clock to `now`; called when the run actually begins.
    pub fn restart_at(&mut self, now: Instant) {
        self.start = now;
        self.last_emit = now;
        self.emitted = 0;
    }

    /// Record that the command at traversal position `processed` was sent.
    pub fn update(&mut self, processed: usize, address: u32, value: u8) -> bool {
        self.update_at(Instant::now(), processed, address, value)
    }

    /// Like [`update`](Self::update) with an explicit clock reading.
    ///
    /// Returns whether a line was emitted.
    pub fn update_at(&mut self, now: Instant, processed: usize, address: u32, value: u8) -> bool {
        let is_last = processed + 1 == self.total;
        if !should_emit(processed, self.last_emit, now, is_last) {
            return false;
        }

        let snapshot = ProgressSnapshot {
            processed_count: processed,
            total_count: self.total,
            elapsed: now.saturating_duration_since(self.start),
            current_address: address,
            current_byte: value,
        };
        let line = render(&snapshot);
        self.sink.status(&snapshot, &line);
        self.last_emit = now;
        self.emitted += 1;
        true
    }

    /// Total commands this reporter expects.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of lines emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Recover the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
