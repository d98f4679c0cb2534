//! Role commands - run one of the three loop processes until Ctrl-C.

use anyhow::{Context, Result};
use scaosim_core::config::ScaoConfig;
use scaosim_core::error::ScaoError;
use scaosim_runtime::role_span;
use scaosim_runtime::roles::{
    HardwareSimulator, PerformanceMonitor, ReconstructorRole, RoleControl, RoleStatus, RunOptions,
};
use std::future::Future;
use tracing::Instrument;

/// Run the hardware simulator.
pub async fn simulate(config: ScaoConfig, cycles: Option<u64>) -> Result<()> {
    let role = HardwareSimulator::new(config);
    let options = RunOptions { max_cycles: cycles };
    supervise(role.control(), role.run(&options)).await
}

/// Run the reconstructor.
pub async fn reconstruct(config: ScaoConfig, cycles: Option<u64>) -> Result<()> {
    let role = ReconstructorRole::new(config);
    let options = RunOptions { max_cycles: cycles };
    supervise(role.control(), role.run(&options)).await
}

/// Run the performance monitor.
pub async fn monitor(config: ScaoConfig, cycles: Option<u64>) -> Result<()> {
    let role = PerformanceMonitor::new(config);
    let options = RunOptions { max_cycles: cycles };
    supervise(role.control(), role.run(&options)).await
}

/// Drive a role loop, stopping it on Ctrl-C.
async fn supervise<F>(control: RoleControl, run: F) -> Result<()>
where
    F: Future<Output = scaosim_core::Result<RoleStatus>>,
{
    let role = control.status().role;
    let signal_control = control.clone();
    let signals = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            signal_control.stop();
        }
    });

    let outcome = run.instrument(role_span!(role)).await;
    signals.abort();

    match outcome {
        Ok(status) => {
            tracing::info!(
                role = %status.role,
                cycles = status.cycles,
                published = status.published,
                stale_reads = status.stale_reads,
                missed = status.missed,
                "Stopped"
            );
            Ok(())
        }
        Err(e) => Err(describe(e)).with_context(|| format!("The {role} stopped on an error")),
    }
}

/// Attach operator guidance to errors that end a role.
fn describe(error: ScaoError) -> anyhow::Error {
    let hint = match &error {
        ScaoError::SchemaMismatch { .. } => Some(
            "another run created this channel with a different shape; \
             stop every role and run `scaosim release --all`",
        ),
        ScaoError::GeometryMismatch { .. } => {
            Some("the simulator and this role disagree on the sensor section of the configuration")
        }
        ScaoError::SegmentCorruption { .. } => Some("release the channel and restart the writer"),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(error).context(hint),
        None => anyhow::Error::new(error),
    }
}
