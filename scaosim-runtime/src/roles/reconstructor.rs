use super::{RoleControl, RoleStatus, RunOptions, StatusTimer, first_write, ticker};
use scaosim_core::clock::{ClockProvider, MonotonicClock};
use scaosim_core::config::ScaoConfig;
use scaosim_core::error::{Result, ScaoError};
use scaosim_core::exchange::{Channel, ChannelLayout, Publisher, Role, Subscriber};
use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::{PhaseMap, SlopeVector, SubapertureMask};
use scaosim_core::reconstruct::{LatencyMonitor, LatencyTransition, Reconstructor};
use scaosim_core::types::Generation;
use std::sync::Arc;
use std::time::Instant;

/// Turns each new slope vector into a reconstructed phase map.
///
/// Before reconstructing anything it checks the published sub-aperture
/// map against its own geometry and refuses to run on a mismatch.
pub struct ReconstructorRole {
    config: ScaoConfig,
    control: RoleControl,
    clock: Arc<dyn ClockProvider>,
}

impl ReconstructorRole {
    /// Create from a validated configuration.
    pub fn new(config: ScaoConfig) -> Self {
        Self {
            config,
            control: RoleControl::new(Role::Reconstructor),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Stamp samples with `clock` instead of the monotonic clock.
    pub fn with_clock(mut self, clock: Arc<dyn ClockProvider>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle for stopping the loop and reading its status.
    pub fn control(&self) -> RoleControl {
        self.control.clone()
    }

    /// Run until stopped, the cycle limit, or a fatal error.
    pub async fn run(&self, options: &RunOptions) -> Result<RoleStatus> {
        let settings = &self.config.reconstructor;
        let geometry = Arc::new(SensorGeometry::from_settings(&self.config.sensor)?);
        let layout = ChannelLayout::from_geometry(&geometry);
        let segments = self.config.segment_config();
        let backoff = self.config.exchange.first_write_backoff.to_backoff();
        let timeout = self.config.exchange.first_write_timeout();

        let mut status = RoleStatus::new(Role::Reconstructor);
        let (_running, mut shutdown) = self.control.start();

        let mut mask_in = Subscriber::<SubapertureMask>::open(Channel::ValidSubapertures, &layout, &segments)?;
        let Some(mask) = first_write(&mut mask_in, &backoff, timeout, &mut shutdown).await? else {
            return Ok(status);
        };
        geometry
            .check_published_mask(&mask.payload)
            .map_err(|cause| ScaoError::GeometryMismatch {
                channel: mask_in.channel().to_string(),
                generation: mask.generation,
                cause,
            })?;

        let mut slopes_in = Subscriber::<SlopeVector>::open(Channel::Slopes, &layout, &segments)?;
        let mut phase_out = Publisher::<PhaseMap>::open_with_clock(
            Channel::ReconstructedPhase,
            &layout,
            &segments,
            Arc::clone(&self.clock),
        )?;

        let reconstructor = settings.method.build(Arc::clone(&geometry), settings);
        let mut latency = LatencyMonitor::for_period(
            self.config.simulator.period(),
            settings.latency_budget,
            settings.backpressure_window,
        );

        tracing::info!(
            role = %Role::Reconstructor,
            method = reconstructor.name(),
            rate_hz = settings.rate_hz,
            n_valid = geometry.n_valid(),
            budget_us = latency.budget().as_micros() as u64,
            "Reconstructor started"
        );

        if first_write(&mut slopes_in, &backoff, timeout, &mut shutdown).await?.is_none() {
            return Ok(status);
        }

        let mut seen = Generation::UNWRITTEN;
        let mut ticks = ticker(settings.period());
        let mut status_timer = StatusTimer::new(settings.status_interval_ms);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(role = %Role::Reconstructor, cycles = status.cycles, "Reconstructor shutting down");
                    break;
                }
                _ = ticks.tick() => {
                    status.cycles += 1;
                    match slopes_in.latest_if_newer(seen) {
                        Ok(Some(sample)) => {
                            let started = Instant::now();
                            let phase = reconstructor.reconstruct(&sample.payload)?;
                            let generation = phase_out.publish(&phase)?;
                            let elapsed = started.elapsed();

                            if !seen.is_unwritten() {
                                status.missed += sample.generation.as_u64() - seen.as_u64() - 1;
                            }
                            seen = sample.generation;
                            status.published += 1;
                            status.last_generation = sample.generation;

                            match latency.record(elapsed) {
                                Some(LatencyTransition::Onset(err)) => {
                                    tracing::warn!(role = %Role::Reconstructor, code = err.code(), "{err}");
                                }
                                Some(LatencyTransition::Recovered { mean }) => {
                                    tracing::info!(
                                        role = %Role::Reconstructor,
                                        mean_us = mean.as_micros() as u64,
                                        "Reconstruction latency back within budget"
                                    );
                                }
                                None => {}
                            }
                            status.backpressure = latency.in_backpressure();
                            status.overruns = latency.overruns();

                            if status_timer.due() {
                                tracing::info!(
                                    role = %Role::Reconstructor,
                                    slopes_generation = %sample.generation,
                                    phase_generation = %generation,
                                    slopes_std = sample.payload.std(),
                                    mean_latency_us = latency.mean().as_micros() as u64,
                                    max_latency_us = latency.max().as_micros() as u64,
                                    missed = status.missed,
                                    "Reconstructor status"
                                );
                            }
                        }
                        Ok(None) => status.idle_cycles += 1,
                        Err(e) if e.is_transient() => {
                            status.stale_reads += 1;
                            tracing::debug!(role = %Role::Reconstructor, error = %e, "Slopes snapshot abandoned");
                        }
                        Err(e) => return Err(e),
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
