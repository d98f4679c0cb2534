//! Exponential poll backoff.

use std::time::Duration;

/// Exponential backoff policy used while polling for a first write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(250), 2.0)
    }
}

impl Backoff {
    /// Shortest delay; a zero delay would never grow and spins the poller.
    pub const MIN_DELAY: Duration = Duration::from_millis(1);

    /// Create a policy. `factor` below 1 is treated as 1, both delays are
    /// at least [`Backoff::MIN_DELAY`] and `initial` is capped at `max`.
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        let max = max.max(Self::MIN_DELAY);
        Self {
            initial: initial.clamp(Self::MIN_DELAY, max),
            max,
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
        }
    }

    /// First delay.
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Delay cap.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay after `delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.factor)
            .map_or(self.max, |next| next.min(self.max))
    }

    /// Infinite sequence of delays starting at `initial`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial), |&d| Some(self.next_delay(d)))
    }
}
