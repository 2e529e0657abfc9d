//! Serial transport for the bootloader console.
//!
//! The upload engine only ever writes; it needs nothing beyond
//! [`std::io::Write`]. The [`Port`] trait adds the bits the CLI reports on
//! and the scoped release of the connection.
//!
//! ```text
//! +------------------+
//! |  Upload Driver   |
//! +--------+---------+
//!          | io::Write
//!          v
//! +--------+---------+
//! |   Port Trait     |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Native SerialPort|
//! |   (serialport)   |
//! +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::Write;
use std::time::Duration;

use crate::error::Result;

/// Serial port configuration.
///
/// The line is always 8N1 without flow control: U-Boot consoles expect
/// exactly that, and the pacing delay stands in for flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout. Nothing is read during an upload.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: Self::DEFAULT_BAUD,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Typical U-Boot console speed.
    pub const DEFAULT_BAUD: u32 = 115200;

    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Write side of a console connection.
pub trait Port: Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Close the port and release resources.
    ///
    /// After calling this method, writes fail with `NotConnected`.
    fn close(&mut self) -> Result<()>;
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
