//! The three role loops.
//!
//! Each role runs its own fixed-rate loop in its own process and talks to
//! the others only through segments. A loop ends when [`RoleControl::stop`]
//! is called (the CLI wires Ctrl-C to it), when an optional cycle limit is
//! reached, or on a fatal error. Transient exchange conditions are handled
//! inside the loop and only show up in the status counters.

mod monitor;
mod reconstructor;
mod simulator;

pub use monitor::PerformanceMonitor;
pub use reconstructor::ReconstructorRole;
pub use simulator::HardwareSimulator;

use parking_lot::RwLock;
use scaosim_core::error::Result;
use scaosim_core::exchange::{Backoff, Role, Sample, Subscriber};
use scaosim_core::payload::Payload;
use scaosim_core::types::Generation;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Counters describing a role's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleStatus {
    /// Which role.
    pub role: Role,
    /// Loop iterations completed.
    pub cycles: u64,
    /// Samples published (all channels).
    pub published: u64,
    /// Cycles with nothing new to process.
    pub idle_cycles: u64,
    /// Cycles abandoned after a stale read.
    pub stale_reads: u64,
    /// Input generations overwritten before they were read.
    pub missed: u64,
    /// Generation of the last sample produced or consumed.
    pub last_generation: Generation,
    /// Backpressure currently declared (reconstructor only).
    pub backpressure: bool,
    /// Cycles over the latency budget (reconstructor only).
    pub overruns: u64,
    /// Latest residual statistic (monitor only).
    pub last_residual: Option<f64>,
    /// Residual reports produced (monitor only).
    pub reports: u64,
}

impl RoleStatus {
    /// Fresh counters for `role`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            cycles: 0,
            published: 0,
            idle_cycles: 0,
            stale_reads: 0,
            missed: 0,
            last_generation: Generation::UNWRITTEN,
            backpressure: false,
            overruns: 0,
            last_residual: None,
            reports: 0,
        }
    }
}

/// Shared state between a running role and its controllers.
struct RoleState {
    running: AtomicBool,
    stop_requested: AtomicBool,
    shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
    status: RwLock<RoleStatus>,
}

/// Handle to stop a role and observe its progress from another task.
#[derive(Clone)]
pub struct RoleControl {
    state: Arc<RoleState>,
}

impl RoleControl {
    /// Create a control for `role`.
    pub fn new(role: Role) -> Self {
        Self {
            state: Arc::new(RoleState {
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                shutdown_tx: RwLock::new(None),
                status: RwLock::new(RoleStatus::new(role)),
            }),
        }
    }

    /// Ask the loop to finish its current cycle and return.
    pub fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
        if let Some(tx) = self.state.shutdown_tx.write().take() {
            let _ = tx.send(());
        }
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the counters.
    pub fn status(&self) -> RoleStatus {
        self.state.status.read().clone()
    }

    /// Mark the loop started. The loop counts as running until the guard
    /// is dropped.
    fn start(&self) -> (RunGuard, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        *self.state.shutdown_tx.write() = Some(tx);
        self.state.running.store(true, Ordering::SeqCst);
        if self.state.stop_requested.load(Ordering::SeqCst) {
            self.stop();
        }
        (RunGuard { control: self.clone() }, rx)
    }

    fn publish_status(&self, status: &RoleStatus) {
        *self.state.status.write() = status.clone();
    }
}

/// Clears the running flag when a loop returns, including on error.
struct RunGuard {
    control: RoleControl,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let state = &self.control.state;
        state.running.store(false, Ordering::SeqCst);
        state.shutdown_tx.write().take();
    }
}

/// Loop options common to all roles.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many cycles.
    pub max_cycles: Option<u64>,
}

impl RunOptions {
    /// Stop after `cycles` cycles.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    fn done(&self, cycles: u64) -> bool {
        self.max_cycles.is_some_and(|max| cycles >= max)
    }
}

/// Fixed-rate ticker that skips missed ticks instead of bursting.
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Rate limiter for periodic status lines.
struct StatusTimer {
    every: Duration,
    last: Instant,
}

impl StatusTimer {
    fn new(every_ms: u64) -> Self {
        Self {
            every: Duration::from_millis(every_ms.max(1)),
            last: Instant::now(),
        }
    }

    fn due(&mut self) -> bool {
        if self.last.elapsed() >= self.every {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Wait for a channel's first write unless shut down first.
///
/// Returns `Ok(None)` on shutdown.
async fn first_write<P: Payload>(
    subscriber: &mut Subscriber<P>,
    backoff: &Backoff,
    timeout: Option<Duration>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Result<Option<Sample<P>>> {
    tokio::select! {
        _ = shutdown => Ok(None),
        sample = subscriber.wait_for_first_write(backoff, timeout) => sample.map(Some),
    }
}
