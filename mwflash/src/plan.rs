//! Upload plan: where the image goes, in which order, and how fast.

use {
    crate::error::{Error, Result},
    std::{fmt, str::FromStr, time::Duration},
};

/// Load address used by the R7800-class U-Boot images this tool targets.
pub const DEFAULT_LOAD_ADDRESS: u32 = 0x4400_0000;

/// Direction in which image bytes are mapped to addresses and sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TraversalOrder {
    /// Lowest address first.
    #[default]
    Ascending,
    /// Highest address first.
    Descending,
}

impl TraversalOrder {
    /// Image indices in traversal order for an image of `length` bytes.
    pub fn indices(self, length: usize) -> Indices {
        Indices {
            front: 0,
            back: length,
            order: self,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

impl fmt::Display for TraversalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraversalOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascending" | "asc" | "forward" => Ok(Self::Ascending),
            "descending" | "desc" | "reverse" => Ok(Self::Descending),
            other => Err(Error::Config(format!(
                "unknown traversal order '{other}' (expected ascending or descending)"
            ))),
        }
    }
}

/// Iterator over image indices in a given [`TraversalOrder`].
#[derive(Debug, Clone)]
pub struct Indices {
    front: usize,
    back: usize,
    order: TraversalOrder,
}

impl Iterator for Indices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.front >= self.back {
            return None;
        }
        match self.order {
            TraversalOrder::Ascending => {
                self.front += 1;
                Some(self.front - 1)
            },
            TraversalOrder::Descending => {
                self.back -= 1;
                Some(self.back)
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Indices {}

/// Immutable description of one upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    base_address: u32,
    length: usize,
    order: TraversalOrder,
    inter_command_delay: Duration,
}

impl UploadPlan {
    /// Build a plan, rejecting images whose last byte would land past
    /// `0xffff_ffff`.
    pub fn new(
        base_address: u32,
        length: usize,
        order: TraversalOrder,
        inter_command_delay: Duration,
    ) -> Result<Self> {
        if length > 0 {
            let last = u32::try_from(length - 1)
                .ok()
                .and_then(|offset| base_address.checked_add(offset));
            if last.is_none() {
                return Err(Error::AddressOverflow {
                    base: base_address,
                    length,
                });
            }
        }

        Ok(Self {
            base_address,
            length,
            order,
            inter_command_delay,
        })
    }

    /// First RAM address of the image.
    pub const fn base_address(&self) -> u32 {
        self.base_address
    }

    /// Number of bytes to send.
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Traversal order.
    pub const fn order(&self) -> TraversalOrder {
        self.order
    }

    /// Fixed delay after each command.
    pub const fn inter_command_delay(&self) -> Duration {
        self.inter_command_delay
    }

    /// Address of image byte `index`.
    ///
    /// Only valid for `index < length`, which `new` guarantees cannot overflow.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn address_of(&self, index: usize) -> u32 {
        self.base_address.wrapping_add(index as u32)
    }

    /// One past the last written address, as printed in the pre-run banner.
    pub fn end_address(&self) -> u64 {
        u64::from(self.base_address) + self.length as u64
    }

    /// Addresses in the order they will be written.
    pub fn addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.order
            .indices(self.length)
            .map(|i| self.address_of(i))
    }

    /// Lower bound on the run time: the pacing delays alone.
    pub fn estimated_duration(&self) -> Duration {
        self.inter_command_delay
            .saturating_mul(u32::try_from(self.length).unwrap_or(u32::MAX))
    }
}
