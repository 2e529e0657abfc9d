//! Upload command implementation.

use {
    super::{PlanSettings, info::PlannedUpload},
    crate::{Cli, CliError, PlanArgs, config::Config, use_fancy_output, was_interrupted},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, theme::ColorfulTheme},
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    log::debug,
    mwflash::{
        FirmwareImage, FixedDelay, NativePort, Pacer, Port, ProgressReporter, ProgressSnapshot,
        SerialConfig, StatusSink, UploadDriver, UploadSummary, ensure_exists, format_hms,
    },
    std::io::{self, IsTerminal, Write},
};

/// Port used when neither the command line nor the config names one.
const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Where status lines go.
enum ConsoleStatus {
    /// Progress bar on an interactive stderr.
    Bar(ProgressBar),
    /// `\r`-overwritten plain line when stderr is not a TTY.
    Plain(Box<dyn Write>),
    /// `--quiet`.
    Hidden,
}

impl ConsoleStatus {
    fn new(cli: &Cli, total: usize) -> Self {
        if cli.quiet {
            Self::Hidden
        } else if use_fancy_output() {
            let pb = ProgressBar::new(total as u64);
            #[allow(clippy::unwrap_used)] // Static template string
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb.set_draw_target(ProgressDrawTarget::stderr());
            Self::Bar(pb)
        } else {
            Self::Plain(Box::new(io::stderr()))
        }
    }

    fn finish(self, completed: bool) {
        match self {
            Self::Bar(pb) if completed => pb.finish(),
            Self::Bar(pb) => pb.abandon(),
            Self::Plain(mut out) => {
                writeln!(out).ok();
            },
            Self::Hidden => {},
        }
    }
}

impl StatusSink for ConsoleStatus {
    fn status(&mut self, snapshot: &ProgressSnapshot, line: &str) {
        match self {
            Self::Bar(pb) => {
                pb.set_position(snapshot.sent() as u64);
                pb.set_message(line.to_string());
            },
            Self::Plain(out) => {
                write!(out, "\r{line}").ok();
                out.flush().ok();
            },
            Self::Hidden => {},
        }
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == io::ErrorKind::Interrupted {
                CliError::Cancelled("Upload cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("Confirmation prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Ask the operator before the first command goes out.
fn confirm_start(cli: &Cli, yes: bool, commands: usize) -> Result<()> {
    if yes || cli.non_interactive {
        return Ok(());
    }
    if !(io::stdin().is_terminal() && io::stderr().is_terminal()) {
        return Err(CliError::Usage(
            "Confirmation needs an interactive terminal; pass --yes to start without it"
                .to_string(),
        )
        .into());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Send {commands} mw.b commands now?"))
        .default(true)
        .interact()
        .map_err(map_prompt_error)?;

    if !confirmed || was_interrupted() {
        return Err(CliError::Cancelled("Upload cancelled".to_string()).into());
    }
    Ok(())
}

/// Run the driver and attach the port and final state to any failure.
fn stream_image<P, W, S>(
    driver: &mut UploadDriver<P>,
    image: &FirmwareImage,
    transport: &mut W,
    reporter: &mut ProgressReporter<S>,
    port_name: &str,
) -> Result<UploadSummary>
where
    P: Pacer,
    W: Write + ?Sized,
    S: StatusSink,
{
    let result = driver.run(image, transport, reporter);
    result.with_context(|| {
        format!(
            "Upload to {} aborted in state {:?}",
            port_name,
            driver.state()
        )
    })
}

/// Upload command implementation.
pub(crate) fn cmd_upload(cli: &Cli, config: &Config, args: &PlanArgs, yes: bool) -> Result<()> {
    let settings = PlanSettings::resolve(args, config)?;

    // Reject a bad path before touching the port.
    ensure_exists(&settings.firmware)?;

    let port_name = cli
        .port
        .clone()
        .or_else(|| config.connection.port.clone())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let baud = cli
        .baud
        .or(config.connection.baud)
        .unwrap_or(SerialConfig::DEFAULT_BAUD);

    if !cli.quiet {
        eprintln!("{}", style("--- Byte-by-byte mw.b upload ---").bold());
        eprintln!(
            "{} Port: {}, Baudrate: {}",
            style("🔌").cyan(),
            port_name,
            baud
        );
    }

    let mut port = NativePort::open(&SerialConfig::new(&port_name, baud))?;
    debug!("Serial port {} ready at {} baud", port.name(), port.baud_rate());

    let planned = PlannedUpload::load(&settings)?;
    let total = planned.plan.length();

    if !cli.quiet {
        planned.print_summary();
        eprintln!(
            "\n{} This will send {} individual mw.b commands ({} order).",
            style("⚠").yellow(),
            total,
            planned.plan.order()
        );
    }

    confirm_start(cli, yes, total)?;

    let mut reporter = ProgressReporter::new(total, ConsoleStatus::new(cli, total));
    let mut driver = UploadDriver::new(
        planned.plan,
        FixedDelay::new(planned.plan.inter_command_delay()),
    );

    let result = stream_image(&mut driver, &planned.image, &mut port, &mut reporter, &port_name);
    debug!("{} status lines emitted", reporter.emitted());
    reporter.into_sink().finish(result.is_ok());
    port.close()?;

    let summary = result?;

    if !cli.quiet {
        eprintln!(
            "\n{} {}",
            style("✓").green().bold(),
            style("BYTE UPLOAD COMPLETE").bold()
        );
        eprintln!(
            "  All {} bytes sent in {}",
            summary.bytes_sent,
            format_hms(summary.duration)
        );
        eprintln!("  Average rate: {:.1} bytes/second", summary.bytes_per_second());
        eprintln!(
            "\nConnect to the serial console and try: {}",
            style(format!("bootm 0x{:08x}", driver.plan().base_address())).cyan()
        );
    }

    Ok(())
}
