//! U-Boot `mw.b` command encoding.
//!
//! The bootloader parses this literal text, so spacing, case, padding and the
//! trailing newline are all part of the contract.

use std::fmt;

/// Length in bytes of every encoded command.
pub const COMMAND_LEN: usize = "mw.b 0x00000000 0x00\n".len();

/// A single memory-write-byte command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteCommand {
    /// Target RAM address.
    pub address: u32,
    /// Byte value written at `address`.
    pub value: u8,
}

impl ByteCommand {
    /// Create a new command.
    pub const fn new(address: u32, value: u8) -> Self {
        Self { address, value }
    }

    /// Render the command as ASCII bytes, newline included.
    pub fn to_bytes(self) -> Vec<u8> {
        encode(self.address, self.value)
    }
}

impl fmt::Display for ByteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mw.b 0x{:08x} 0x{:02x}", self.address, self.value)
    }
}

/// Encode `mw.b 0x<address> 0x<value>\n` as ASCII.
pub fn encode(address: u32, value: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(COMMAND_LEN);
    out.extend_from_slice(format!("mw.b 0x{address:08x} 0x{value:02x}\n").as_bytes());
    out
}
