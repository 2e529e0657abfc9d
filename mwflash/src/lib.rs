//! # mwflash
//!
//! A library for staging firmware in a device's RAM through a U-Boot serial
//! console when the bootloader's bulk-load paths (`loady`, `loadb`, TFTP) are
//! unavailable.
//!
//! Every byte of the image becomes one `mw.b 0x<address> 0x<value>` command.
//! Commands are paced by a fixed delay so the bootloader's line parser keeps
//! up, and progress is reported as a periodically refreshed status line.
//! Booting the staged image (`bootm`) is left to the operator.
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via `serialport`
//! - `serde`: Serialization support for [`TraversalOrder`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mwflash::{FirmwareImage, FixedDelay, NullSink, ProgressReporter, TraversalOrder,
//!     UploadDriver, UploadPlan};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::load("initramfs-uImage")?;
//!     let plan = UploadPlan::new(
//!         0x4400_0000,
//!         image.len(),
//!         TraversalOrder::Ascending,
//!         Duration::from_millis(5),
//!     )?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let mut port = mwflash::NativePort::open_simple("/dev/ttyUSB0", 115200)?;
//!         let mut reporter = ProgressReporter::new(image.len(), NullSink);
//!         let mut driver = UploadDriver::new(plan, FixedDelay::new(plan.inter_command_delay()));
//!         let summary = driver.run(&image, &mut port, &mut reporter)?;
//!         println!("{:.1} bytes/s", summary.bytes_per_second());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod command;
pub mod error;
pub mod image;
pub mod pacer;
pub mod plan;
pub mod port;
pub mod progress;
pub mod upload;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled between upload commands.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    command::{ByteCommand, encode},
    error::{Error, Result},
    image::{FirmwareImage, ensure_exists},
    pacer::{FixedDelay, Pacer},
    plan::{DEFAULT_LOAD_ADDRESS, TraversalOrder, UploadPlan},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    progress::{
        NullSink, ProgressReporter, ProgressSnapshot, StatusSink, format_hms, render, should_emit,
    },
    upload::{AbortReason, UploadDriver, UploadState, UploadSummary},
};
