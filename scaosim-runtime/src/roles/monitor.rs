use super::{RoleControl, RoleStatus, RunOptions, StatusTimer, first_write, ticker};
use scaosim_core::aggregate::PerformanceAggregator;
use scaosim_core::config::ScaoConfig;
use scaosim_core::error::Result;
use scaosim_core::exchange::{Channel, ChannelLayout, Role, Sample, Subscriber};
use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::PhaseMap;
use scaosim_core::types::Generation;

/// Compares the true phase with the reconstruction and reports the
/// residual.
pub struct PerformanceMonitor {
    config: ScaoConfig,
    control: RoleControl,
}

impl PerformanceMonitor {
    /// Create from a validated configuration.
    pub fn new(config: ScaoConfig) -> Self {
        Self {
            config,
            control: RoleControl::new(Role::PerformanceMonitor),
        }
    }

    /// Handle for stopping the loop and reading its status.
    pub fn control(&self) -> RoleControl {
        self.control.clone()
    }

    /// Run until stopped, the cycle limit, or a fatal error.
    pub async fn run(&self, options: &RunOptions) -> Result<RoleStatus> {
        let settings = &self.config.monitor;
        let geometry = SensorGeometry::from_settings(&self.config.sensor)?;
        let layout = ChannelLayout::from_geometry(&geometry);
        let segments = self.config.segment_config();
        let backoff = self.config.exchange.first_write_backoff.to_backoff();
        let timeout = self.config.exchange.first_write_timeout();

        let mut status = RoleStatus::new(Role::PerformanceMonitor);
        let (_running, mut shutdown) = self.control.start();

        let mut truth_in = Subscriber::<PhaseMap>::open(Channel::TruePhase, &layout, &segments)?;
        let mut recon_in = Subscriber::<PhaseMap>::open(Channel::ReconstructedPhase, &layout, &segments)?;
        let mut aggregator =
            PerformanceAggregator::new(geometry.pupil().to_vec(), settings.statistic, settings.max_skew());

        tracing::info!(
            role = %Role::PerformanceMonitor,
            rate_hz = settings.rate_hz,
            statistic = %settings.statistic,
            "Monitor started"
        );

        let Some(first_truth) = first_write(&mut truth_in, &backoff, timeout, &mut shutdown).await? else {
            return Ok(status);
        };
        let Some(first_recon) = first_write(&mut recon_in, &backoff, timeout, &mut shutdown).await? else {
            return Ok(status);
        };
        let mut truth = Some(first_truth);
        let mut recon = Some(first_recon);

        let mut ticks = ticker(settings.period());
        let mut status_timer = StatusTimer::new(settings.status_interval_ms);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(role = %Role::PerformanceMonitor, reports = status.reports, "Monitor shutting down");
                    break;
                }
                _ = ticks.tick() => {
                    status.cycles += 1;
                    refresh(&mut truth_in, &mut truth, &mut status)?;
                    refresh(&mut recon_in, &mut recon, &mut status)?;

                    // Reports only when the reconstruction has advanced.
                    match aggregator.observe(truth.as_ref(), recon.as_ref())? {
                        Some(report) => {
                            status.reports = report.reports;
                            status.last_residual = Some(report.residual);
                            status.last_generation = report.recon_generation;
                            tracing::debug!(
                                truth_generation = %report.truth_generation,
                                recon_generation = %report.recon_generation,
                                residual = report.residual,
                                skew_us = report.skew.as_micros() as u64,
                                stale = report.stale,
                                "Residual"
                            );
                            if status_timer.due() {
                                tracing::info!(
                                    role = %Role::PerformanceMonitor,
                                    recon_generation = %report.recon_generation,
                                    residual = report.residual,
                                    running_mean = report.running_mean,
                                    running_rms = report.running_rms,
                                    reports = report.reports,
                                    "Monitor status"
                                );
                            }
                        }
                        None => status.idle_cycles += 1,
                    }

                    self.control.publish_status(&status);
                    if options.done(status.cycles) {
                        break;
                    }
                }
            }
        }

        Ok(status)
    }
}

/// Replace `held` with a newer sample if one is available.
///
/// Transient read failures keep the previous sample and are counted.
fn refresh(
    subscriber: &mut Subscriber<PhaseMap>,
    held: &mut Option<Sample<PhaseMap>>,
    status: &mut RoleStatus,
) -> Result<()> {
    let seen = held.as_ref().map(|s| s.generation).unwrap_or(Generation::UNWRITTEN);
    match subscriber.latest_if_newer(seen) {
        Ok(Some(sample)) => {
            *held = Some(sample);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) if e.is_transient() => {
            status.stale_reads += 1;
            tracing::debug!(channel = subscriber.channel(), error = %e, "Snapshot abandoned");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
