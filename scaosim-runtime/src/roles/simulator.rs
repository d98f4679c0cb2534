use super::{RoleControl, RoleStatus, RunOptions, StatusTimer, ticker};
use crate::optics::{PhaseScreen, ShackHartmann};
use scaosim_core::clock::{ClockProvider, MonotonicClock};
use scaosim_core::config::ScaoConfig;
use scaosim_core::error::Result;
use scaosim_core::exchange::{Channel, ChannelLayout, Publisher, Role};
use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::{PhaseMap, SlopeVector, SubapertureMask};
use std::sync::Arc;

/// Stand-in for the wavefront sensor hardware.
///
/// Publishes the valid sub-aperture map once, then on every tick advances
/// the phase screen and publishes the true phase followed by the slopes
/// measured from it.
pub struct HardwareSimulator {
    config: ScaoConfig,
    control: RoleControl,
    clock: Arc<dyn ClockProvider>,
}

impl HardwareSimulator {
    /// Create from a validated configuration.
    pub fn new(config: ScaoConfig) -> Self {
        Self {
            config,
            control: RoleControl::new(Role::HardwareSimulator),
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
        let settings = &self.config.simulator;
        let geometry = SensorGeometry::from_settings(&self.config.sensor)?;
        let layout = ChannelLayout::from_geometry(&geometry);
        let segments = self.config.segment_config();

        let mut mask_out = Publisher::<SubapertureMask>::open_with_clock(
            Channel::ValidSubapertures,
            &layout,
            &segments,
            Arc::clone(&self.clock),
        )?;
        let mut truth_out =
            Publisher::<PhaseMap>::open_with_clock(Channel::TruePhase, &layout, &segments, Arc::clone(&self.clock))?;
        let mut slopes_out =
            Publisher::<SlopeVector>::open_with_clock(Channel::Slopes, &layout, &segments, Arc::clone(&self.clock))?;

        let mut status = RoleStatus::new(Role::HardwareSimulator);
        mask_out.publish(geometry.valid_subapertures())?;
        status.published += 1;

        let period = settings.period();
        let mut screen = PhaseScreen::new(settings, &geometry, period);
        let wfs = ShackHartmann::new(&geometry);
        let mut phase = geometry.zero_phase();
        let mut slopes = SlopeVector::zeros(geometry.n_valid());

        tracing::info!(
            role = %Role::HardwareSimulator,
            rate_hz = settings.rate_hz,
            pupil_width = geometry.pupil_width(),
            nsubx = geometry.nsubx(),
            n_valid = geometry.n_valid(),
            modes = screen.modes().len(),
            seed = settings.seed,
            "Simulator started"
        );

        let (_running, mut shutdown) = self.control.start();
        let mut ticks = ticker(period);
        let mut status_timer = StatusTimer::new(settings.status_interval_ms);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(role = %Role::HardwareSimulator, cycles = status.cycles, "Simulator shutting down");
                    break;
                }
                _ = ticks.tick() => {
                    screen.step();
                    screen.render_into(&mut phase, geometry.pupil());
                    wfs.measure_into(&phase, &mut slopes);

                    truth_out.publish(&phase)?;
                    let generation = slopes_out.publish(&slopes)?;
                    status.cycles += 1;
                    status.published += 2;
                    status.last_generation = generation;

                    if status_timer.due() {
                        tracing::info!(
                            role = %Role::HardwareSimulator,
                            generation = %generation,
                            rms_wf = phase.masked_std(geometry.pupil()),
                            slopes_std = slopes.std(),
                            "Simulator status"
                        );
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
