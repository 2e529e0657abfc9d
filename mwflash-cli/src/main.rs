//! mwflash CLI - Stage firmware in RAM through a U-Boot serial console.
//!
//! ## Features
//!
//! - Byte-by-byte `mw.b` upload in ascending or descending address order
//! - Fixed inter-command pacing
//! - Live progress with ETA
//! - Plan inspection without touching the port
//! - Serial port listing and shell completion generation
//! - Configuration file and environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::{debug, warn};
use mwflash::TraversalOrder;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress bars and colors should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was received.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// CLI-level failures that map to dedicated exit codes.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing interactive terminal.
    #[error("{0}")]
    Usage(String),
    /// The operator declined or interrupted the operation.
    #[error("{0}")]
    Cancelled(String),
}

/// Exit codes.
mod exit_code {
    pub const GENERIC: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const TRANSPORT: i32 = 4;
    pub const CANCELLED: i32 = 130;
}

/// mwflash - Stage firmware in RAM through a U-Boot console, one `mw.b` at a time.
///
/// Environment variables:
///   MWFLASH_PORT              - Default serial port
///   MWFLASH_BAUD              - Default baud rate (default: 115200)
///   MWFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "mwflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port connected to the bootloader console.
    #[arg(short, long, global = true, env = "MWFLASH_PORT")]
    pub port: Option<String>,

    /// Console baud rate [default: 115200].
    #[arg(short, long, global = true, env = "MWFLASH_BAUD")]
    pub baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Non-interactive mode (never prompt).
    #[arg(long, global = true, env = "MWFLASH_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Address traversal order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Order {
    /// Lowest address first.
    #[value(alias = "asc")]
    Ascending,
    /// Highest address first.
    #[value(alias = "desc", alias = "reverse")]
    Descending,
}

impl From<Order> for TraversalOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Ascending => TraversalOrder::Ascending,
            Order::Descending => TraversalOrder::Descending,
        }
    }
}

/// Plan options shared by `upload` and `info`.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct PlanArgs {
    /// Path to the firmware image.
    pub firmware: PathBuf,

    /// RAM load address [default: 0x44000000].
    #[arg(short, long, value_parser = parse_hex_u32)]
    pub address: Option<u32>,

    /// Delay after each command in milliseconds [default: 5].
    #[arg(short, long = "delay-ms", value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Address traversal order [default: ascending].
    #[arg(short, long, value_enum)]
    pub order: Option<Order>,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Upload a firmware image with one mw.b command per byte.
    Upload {
        #[command(flatten)]
        plan: PlanArgs,

        /// Start without asking for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the upload plan for an image without opening a port.
    Info {
        #[command(flatten)]
        plan: PlanArgs,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
pub(crate) fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0x4400_0000
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Map an error chain to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => exit_code::USAGE,
            CliError::Cancelled(_) => exit_code::CANCELLED,
        };
    }
    if let Some(lib_err) = err.downcast_ref::<mwflash::Error>() {
        return match lib_err {
            mwflash::Error::Config(_) => exit_code::CONFIG,
            mwflash::Error::TransportOpen { .. } => exit_code::TRANSPORT,
            mwflash::Error::Cancelled => exit_code::CANCELLED,
            mwflash::Error::AddressOverflow { .. } => exit_code::USAGE,
            _ => exit_code::GENERIC,
        };
    }
    exit_code::GENERIC
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        warn!("Could not install Ctrl-C handler: {e}");
    }
    mwflash::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Upload { plan, yes } => commands::upload::cmd_upload(cli, &config, plan, *yes),
        Commands::Info { plan, json } => commands::info::cmd_info(&config, plan, *json),
        Commands::ListPorts { json } => commands::info::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "mwflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}
