//! Monotonic timestamps.
//!
//! Every `now` handed to the controller and broadcaster is a [`Timestamp`]:
//! milliseconds elapsed on the controller's monotonic clock. Durations are
//! plain millisecond counts. All arithmetic saturates, so a timestamp that
//! is older than a stored one yields an elapsed time of zero instead of
//! wrapping.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Milliseconds since the controller's clock started.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from a millisecond count.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// The raw millisecond count.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed between `earlier` and `self` (zero if `earlier`
    /// is in the future).
    pub const fn millis_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// This timestamp shifted forward by `ms` milliseconds.
    pub const fn plus_millis(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates() {
        let early = Timestamp::from_millis(100);
        let late = Timestamp::from_millis(350);
        assert_eq!(late.millis_since(early), 250);
        assert_eq!(early.millis_since(late), 0);
    }

    #[test]
    fn plus_saturates() {
        assert_eq!(Timestamp(u64::MAX).plus_millis(5), Timestamp(u64::MAX));
        assert_eq!(Timestamp::ZERO.plus_millis(150), Timestamp(150));
    }
}
