//! Clock provider for sample timestamps.
//!
//! Samples are stamped by the writer and compared by readers living in
//! other processes, so production code reads the host-wide monotonic
//! clock rather than a process-local `Instant`. Tests use a mock clock
//! with controllable time.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Provider trait for time operations.
pub trait ClockProvider: Send + Sync {
    /// Current monotonic time.
    fn now(&self) -> Timestamp;

    /// Advance time by the specified duration (mock-only operation).
    ///
    /// Real implementations should do nothing.
    fn advance(&self, duration: Duration);

    /// Check if this is a mock clock.
    fn is_mock(&self) -> bool;
}

/// Host-wide monotonic clock (`CLOCK_MONOTONIC`).
///
/// Readings taken in different processes on the same host share an
/// epoch, which is what makes cross-channel skew meaningful.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Create a new monotonic clock.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn monotonic_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC is
    // supported on every unix target we build for.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}

#[cfg(not(unix))]
fn monotonic_nanos() -> u64 {
    // No host-wide monotonic epoch available; stamps are only comparable
    // within this process.
    use std::sync::OnceLock;
    use std::time::Instant;
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

impl ClockProvider for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(monotonic_nanos())
    }

    fn advance(&self, _duration: Duration) {
        // Real clock cannot be manually advanced
    }

    fn is_mock(&self) -> bool {
        false
    }
}

/// Mock clock for testing with controllable time.
///
/// Starts at the given reading and only advances when told to via
/// `advance()`.
#[derive(Debug, Default)]
pub struct MockClock {
    current_nanos: AtomicU64,
}

impl MockClock {
    /// Create a mock clock starting at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock clock starting at the given reading.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            current_nanos: AtomicU64::new(start.as_nanos()),
        }
    }

    /// Set the clock to an absolute reading.
    pub fn set(&self, now: Timestamp) {
        self.current_nanos.store(now.as_nanos(), Ordering::SeqCst);
    }
}

impl ClockProvider for MockClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.current_nanos.load(Ordering::SeqCst))
    }

    fn advance(&self, duration: Duration) {
        self.current_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    fn is_mock(&self) -> bool {
        true
    }
}
