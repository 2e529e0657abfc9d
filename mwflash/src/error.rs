//! Error types for mwflash.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for mwflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mwflash operations.
///
/// Every variant is terminal: the upload engine never retries, so callers
/// should report the error and start over.
#[derive(Debug, Error)]
pub enum Error {
    /// Firmware image does not exist.
    #[error("Firmware file not found: {}", path.display())]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error outside of open/write (e.g. enumeration).
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport could not be opened.
    #[cfg(feature = "native")]
    #[error("Could not open serial port {port}: {source}")]
    TransportOpen {
        /// Port name/path.
        port: String,
        /// Underlying serial error.
        source: serialport::Error,
    },

    /// Writing a command to the transport failed mid-run.
    #[error("Transport write failed at address {address:#010x}: {source}")]
    TransportWrite {
        /// Address of the command that could not be sent.
        address: u32,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Flushing the transport after the last command failed.
    #[error("Transport flush failed: {0}")]
    TransportFlush(#[source] io::Error),

    /// The plan disagrees with the image or the progress reporter.
    #[error("Invalid upload plan: {0}")]
    InvalidPlan(String),

    /// The image does not fit in the 32-bit address space at this base.
    #[error("Image of {length} bytes at {base:#010x} overflows the 32-bit address space")]
    AddressOverflow {
        /// Load base address.
        base: u32,
        /// Image length in bytes.
        length: usize,
    },

    /// The run was cancelled between two commands.
    #[error("Upload cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error was raised by a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
