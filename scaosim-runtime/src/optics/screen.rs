//! Evolving turbulence phase screen.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use scaosim_core::config::SimulatorSettings;
use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::PhaseMap;
use std::f64::consts::PI;
use std::time::Duration;

/// Wavelength at which `r0` is specified, in microns.
const R0_WAVELENGTH_UM: f64 = 0.5;

/// One Fourier component of the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMode {
    /// Spatial frequency (x, y) in cycles per metre.
    pub frequency: [f64; 2],
    /// RMS amplitude in microns.
    pub amplitude: f64,
    /// Current complex coefficient (re, im) in microns.
    pub coefficient: [f64; 2],
}

/// Sum of Fourier modes translated by the wind and refreshed by an AR(1)
/// update.
///
/// Mode `k` has frequency magnitude `k / (2 D)` in a random direction and
/// an amplitude following the Kolmogorov `f^(-11/6)` envelope scaled by
/// `r0^(-5/6)`. Each step shifts every mode by `wind × dt` (frozen flow),
/// then mixes in fresh noise with weight `sqrt(1 - laminar²)` so the
/// screen stays statistically stationary. Seeded, so a given
/// configuration always produces the same sequence.
pub struct PhaseScreen {
    rng: StdRng,
    modes: Vec<ScreenMode>,
    width: usize,
    pixel_scale: f64,
    wind: [f64; 2],
    dt: f64,
    laminar: f64,
    steps: u64,
    /// Per-mode column and row phasors, refreshed per render.
    col_phasors: Vec<[f64; 2]>,
    row_phasors: Vec<[f64; 2]>,
}

impl PhaseScreen {
    /// Create a screen for `geometry` advancing `dt` per step.
    pub fn new(settings: &SimulatorSettings, geometry: &SensorGeometry, dt: Duration) -> Self {
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let diameter = settings.diameter;
        let df = 1.0 / (2.0 * diameter);
        let to_microns = R0_WAVELENGTH_UM / (2.0 * PI);

        let modes = (1..=settings.modes)
            .map(|k| {
                let f = k as f64 * df;
                let theta = rng.random_range(0.0..2.0 * PI);
                // Variance of a ring of width df of the Kolmogorov spectrum.
                let psd = 0.023 * settings.r0.powf(-5.0 / 3.0) * f.powf(-11.0 / 3.0);
                let amplitude = (psd * 2.0 * PI * f * df).sqrt() * to_microns;
                let coefficient = [
                    amplitude * rng.sample::<f64, _>(StandardNormal) / 2f64.sqrt(),
                    amplitude * rng.sample::<f64, _>(StandardNormal) / 2f64.sqrt(),
                ];
                ScreenMode {
                    frequency: [f * theta.cos(), f * theta.sin()],
                    amplitude,
                    coefficient,
                }
            })
            .collect::<Vec<_>>();

        let width = geometry.pupil_width();
        let n = modes.len();
        Self {
            rng,
            modes,
            width,
            pixel_scale: diameter / width as f64,
            wind: settings.wind,
            dt: dt.as_secs_f64(),
            laminar: settings.laminar,
            steps: 0,
            col_phasors: vec![[0.0; 2]; n * width],
            row_phasors: vec![[0.0; 2]; n * width],
        }
    }

    /// Advance one sensing cycle.
    pub fn step(&mut self) {
        let innovation = (1.0 - self.laminar * self.laminar).max(0.0).sqrt();
        let [wx, wy] = self.wind;
        for mode in &mut self.modes {
            let shift = -2.0 * PI * (mode.frequency[0] * wx + mode.frequency[1] * wy) * self.dt;
            let (s, c) = shift.sin_cos();
            let [re, im] = mode.coefficient;
            let rotated = [re * c - im * s, re * s + im * c];

            let noise = mode.amplitude / 2f64.sqrt();
            let nr: f64 = self.rng.sample(StandardNormal);
            let ni: f64 = self.rng.sample(StandardNormal);
            mode.coefficient = [
                self.laminar * rotated[0] + innovation * noise * nr,
                self.laminar * rotated[1] + innovation * noise * ni,
            ];
        }
        self.steps += 1;
    }

    /// Evaluate the screen over the grid, zero outside `pupil`.
    pub fn render_into(&mut self, map: &mut PhaseMap, pupil: &[bool]) {
        let w = self.width;
        for (k, mode) in self.modes.iter().enumerate() {
            for i in 0..w {
                let pos = i as f64 * self.pixel_scale;
                let (sx, cx) = (2.0 * PI * mode.frequency[0] * pos).sin_cos();
                let (sy, cy) = (2.0 * PI * mode.frequency[1] * pos).sin_cos();
                self.col_phasors[k * w + i] = [cx, sx];
                self.row_phasors[k * w + i] = [cy, sy];
            }
        }

        let values = map.as_mut_slice();
        for row in 0..w {
            for col in 0..w {
                let idx = row * w + col;
                if !pupil[idx] {
                    values[idx] = 0.0;
                    continue;
                }
                let mut acc = 0.0;
                for (k, mode) in self.modes.iter().enumerate() {
                    let [xr, xi] = self.col_phasors[k * w + col];
                    let [yr, yi] = self.row_phasors[k * w + row];
                    // Re(c · e^{i kx x} · e^{i ky y})
                    let pr = xr * yr - xi * yi;
                    let pim = xr * yi + xi * yr;
                    acc += mode.coefficient[0] * pr - mode.coefficient[1] * pim;
                }
                values[idx] = acc as f32;
            }
        }
    }

    /// Render into a new map.
    pub fn render(&mut self, pupil: &[bool]) -> PhaseMap {
        let mut map = PhaseMap::zeros(self.width, self.width);
        self.render_into(&mut map, pupil);
        map
    }

    /// Modes of the screen.
    pub fn modes(&self) -> &[ScreenMode] {
        &self.modes
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaosim_core::config::SensorSettings;

    fn geometry() -> SensorGeometry {
        SensorGeometry::from_settings(&SensorSettings {
            pupil_width: 16,
            nsubx: 4,
            ..SensorSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn same_seed_same_screen() {
        let geometry = geometry();
        let settings = SimulatorSettings::default();
        let dt = Duration::from_millis(2);
        let mut a = PhaseScreen::new(&settings, &geometry, dt);
        let mut b = PhaseScreen::new(&settings, &geometry, dt);
        for _ in 0..5 {
            a.step();
            b.step();
        }
        assert_eq!(a.render(geometry.pupil()), b.render(geometry.pupil()));
        assert_eq!(a.steps(), 5);
    }

    #[test]
    fn different_seed_different_screen() {
        let geometry = geometry();
        let dt = Duration::from_millis(2);
        let mut a = PhaseScreen::new(&SimulatorSettings::default(), &geometry, dt);
        let mut b = PhaseScreen::new(
            &SimulatorSettings {
                seed: 99,
                ..SimulatorSettings::default()
            },
            &geometry,
            dt,
        );
        assert_ne!(a.render(geometry.pupil()), b.render(geometry.pupil()));
    }

    #[test]
    fn masked_outside_pupil_and_nonzero_inside() {
        let geometry = geometry();
        let mut screen =
            PhaseScreen::new(&SimulatorSettings::default(), &geometry, Duration::from_millis(2));
        let map = screen.render(geometry.pupil());
        for (v, &p) in map.as_slice().iter().zip(geometry.pupil()) {
            if !p {
                assert_eq!(*v, 0.0);
            }
        }
        assert!(map.as_slice().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn amplitudes_fall_with_frequency() {
        let geometry = geometry();
        let screen =
            PhaseScreen::new(&SimulatorSettings::default(), &geometry, Duration::from_millis(2));
        let amps: Vec<f64> = screen.modes().iter().map(|m| m.amplitude).collect();
        assert_eq!(amps.len(), 24);
        assert!(amps.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn screen_evolves() {
        let geometry = geometry();
        let mut screen =
            PhaseScreen::new(&SimulatorSettings::default(), &geometry, Duration::from_millis(2));
        let before = screen.render(geometry.pupil());
        screen.step();
        assert_ne!(before, screen.render(geometry.pupil()));
    }
}
