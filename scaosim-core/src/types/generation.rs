//! Sample version and time stamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Monotonically increasing version of a channel's latest sample.
///
/// Generation 0 is reserved for "never written". Each publish advances
/// the generation by exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The generation of a segment nobody has published to.
    pub const UNWRITTEN: Self = Self(0);

    /// Create a generation from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if no sample has been published yet.
    #[must_use]
    pub const fn is_unwritten(&self) -> bool {
        self.0 == 0
    }

    /// The generation that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Decode a generation from a sequence counter value.
    ///
    /// The sequence counter is `2 * generation`, plus one while a publish
    /// is in flight.
    #[must_use]
    pub const fn from_sequence(seq: u64) -> Self {
        Self(seq >> 1)
    }

    /// The stable (even) sequence value for this generation.
    #[must_use]
    pub const fn to_sequence(&self) -> u64 {
        self.0 << 1
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Monotonic clock reading in nanoseconds.
///
/// Stamps come from a host-wide monotonic clock so that samples written
/// by different processes are comparable.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get the raw nanosecond value.
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Absolute distance between two stamps.
    #[must_use]
    pub fn abs_diff(&self, other: Self) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[must_use]
    pub fn saturating_since(&self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}
