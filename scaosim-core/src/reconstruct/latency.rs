use crate::error::ScaoError;
use std::collections::VecDeque;
use std::time::Duration;

/// Change of backpressure state reported by [`LatencyMonitor::record`].
#[derive(Debug)]
pub enum LatencyTransition {
    /// The moving mean crossed above the budget.
    Onset(ScaoError),
    /// The moving mean fell back within the budget.
    Recovered {
        /// Moving mean at recovery.
        mean: Duration,
    },
}

/// Moving-window check of reconstruction latency against a budget.
///
/// Backpressure is only declared on a full window. It is observable and
/// never throttles the writer.
#[derive(Debug, Clone)]
pub struct LatencyMonitor {
    budget: Duration,
    window: usize,
    samples: VecDeque<Duration>,
    total: Duration,
    in_backpressure: bool,
    overruns: u64,
    cycles: u64,
    max: Duration,
}

impl LatencyMonitor {
    /// Create with a per-cycle budget and a window length (at least 1).
    pub fn new(budget: Duration, window: usize) -> Self {
        let window = window.max(1);
        Self {
            budget,
            window,
            samples: VecDeque::with_capacity(window),
            total: Duration::ZERO,
            in_backpressure: false,
            overruns: 0,
            cycles: 0,
            max: Duration::ZERO,
        }
    }

    /// Budget derived from the sensing period.
    pub fn for_period(period: Duration, fraction: f64, window: usize) -> Self {
        let budget = Duration::try_from_secs_f64(period.as_secs_f64() * fraction.max(0.0))
            .unwrap_or(Duration::MAX);
        Self::new(budget, window)
    }

    /// Record one reconstruction and report a state change, if any.
    pub fn record(&mut self, latency: Duration) -> Option<LatencyTransition> {
        self.cycles += 1;
        self.max = self.max.max(latency);
        if latency > self.budget {
            self.overruns += 1;
        }

        self.samples.push_back(latency);
        self.total += latency;
        if self.samples.len() > self.window {
            if let Some(old) = self.samples.pop_front() {
                self.total -= old;
            }
        }
        if self.samples.len() < self.window {
            return None;
        }

        let mean = self.mean();
        match (self.in_backpressure, mean > self.budget) {
            (false, true) => {
                self.in_backpressure = true;
                Some(LatencyTransition::Onset(ScaoError::Backpressure {
                    mean,
                    budget: self.budget,
                    window: self.window,
                }))
            }
            (true, false) => {
                self.in_backpressure = false;
                Some(LatencyTransition::Recovered { mean })
            }
            _ => None,
        }
    }

    /// Mean over the current window.
    pub fn mean(&self) -> Duration {
        if self.samples.is_empty() {
            Duration::ZERO
        } else {
            self.total / self.samples.len() as u32
        }
    }

    /// Allowed latency per cycle.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Whether the moving mean currently exceeds the budget.
    pub fn in_backpressure(&self) -> bool {
        self.in_backpressure
    }

    /// Cycles whose own latency exceeded the budget.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Cycles recorded.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Slowest cycle recorded.
    pub fn max(&self) -> Duration {
        self.max
    }
}
