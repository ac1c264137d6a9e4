//! Relative timelock duration for the escrow's waiting branch.

use bitcoin::Sequence;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelockError {
    #[error("Timelock must be positive and less than 2^16")]
    InvalidBlocks(u32),
}

/// Timelock duration in blocks (~10 min each)
///
/// Bounded to `u16` because that is the range a CSV script value can express
/// as a block count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timelock(u16);

impl Timelock {
    /// Create a timelock from a number of blocks
    pub fn from_blocks(blocks: u16) -> Result<Self, TimelockError> {
        if blocks == 0 {
            return Err(TimelockError::InvalidBlocks(blocks as u32));
        }
        Ok(Self(blocks))
    }

    /// 30 days (~4,320 blocks)
    pub fn thirty_days() -> Self {
        Self(4_320)
    }

    /// 6 months (~26,280 blocks)
    pub fn six_months() -> Self {
        Self(26_280)
    }

    /// Custom duration in days
    pub fn days(days: u16) -> Result<Self, TimelockError> {
        let blocks = (days as u32) * 144; // ~144 blocks per day
        if blocks > u16::MAX as u32 {
            return Err(TimelockError::InvalidBlocks(blocks));
        }
        Self::from_blocks(blocks as u16)
    }

    /// Get the block count
    pub fn blocks(&self) -> u16 {
        self.0
    }

    /// Convert to the sequence value a spending input must carry to satisfy
    /// the CSV check
    pub fn to_sequence(&self) -> Sequence {
        Sequence::from_height(self.0)
    }
}

impl fmt::Display for Timelock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.0 / 144;
        if days >= 365 {
            write!(f, "~{:.1} years ({} blocks)", days as f32 / 365.0, self.0)
        } else if days >= 30 {
            write!(f, "~{:.1} months ({} blocks)", days as f32 / 30.0, self.0)
        } else {
            write!(f, "~{} days ({} blocks)", days, self.0)
        }
    }
}

impl Ord for Timelock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Timelock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
