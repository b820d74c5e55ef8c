//! Shared value types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subunits per base unit (satoshis per coin)
pub const SUBUNITS_PER_UNIT: u64 = 100_000_000;

/// Non-negative balance held in ledger subunits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Balance(pub u64);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    pub fn from_subunits(subunits: u64) -> Self {
        Balance(subunits)
    }

    pub fn subunits(&self) -> u64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

/// Base-unit amount with exactly 8 decimal places, e.g. `1.50000000`
impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:08}",
            self.0 / SUBUNITS_PER_UNIT,
            self.0 % SUBUNITS_PER_UNIT
        )
    }
}

/// Seconds since the unix epoch, 0 if the clock is before it
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
