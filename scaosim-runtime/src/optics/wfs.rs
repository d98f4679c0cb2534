//! Geometric Shack–Hartmann wavefront sensor.

use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::{PhaseMap, SlopeVector};

/// Pixel index pairs whose phase difference is one gradient sample.
#[derive(Debug, Clone, Default)]
struct SubapertureStencil {
    x_pairs: Vec<(usize, usize)>,
    y_pairs: Vec<(usize, usize)>,
}

/// Measures the mean phase gradient over each valid sub-aperture.
///
/// Gradients are forward differences between adjacent illuminated pixels
/// inside the sub-aperture, in microns per pixel. Output is one (x, y)
/// pair per valid sub-aperture in row-major order.
#[derive(Debug, Clone)]
pub struct ShackHartmann {
    width: usize,
    stencils: Vec<SubapertureStencil>,
}

impl ShackHartmann {
    /// Build the sensor for `geometry`.
    pub fn new(geometry: &SensorGeometry) -> Self {
        let width = geometry.pupil_width();
        let sub = geometry.subwidth();
        let pupil = geometry.pupil();

        let stencils = geometry
            .valid_subapertures()
            .valid_indices()
            .map(|(sr, sc)| {
                let mut stencil = SubapertureStencil::default();
                for r in sr * sub..(sr + 1) * sub {
                    for c in sc * sub..(sc + 1) * sub {
                        let here = r * width + c;
                        if !pupil[here] {
                            continue;
                        }
                        if c + 1 < (sc + 1) * sub && pupil[here + 1] {
                            stencil.x_pairs.push((here, here + 1));
                        }
                        if r + 1 < (sr + 1) * sub && pupil[here + width] {
                            stencil.y_pairs.push((here, here + width));
                        }
                    }
                }
                stencil
            })
            .collect();

        Self { width, stencils }
    }

    /// Number of slope pairs produced.
    pub fn n_valid(&self) -> usize {
        self.stencils.len()
    }

    /// Measure `phase` into `slopes`.
    ///
    /// # Panics
    /// Panics if `phase` is not the configured grid or `slopes` has the
    /// wrong length.
    pub fn measure_into(&self, phase: &PhaseMap, slopes: &mut SlopeVector) {
        assert_eq!(phase.cols(), self.width, "phase map width");
        assert_eq!(slopes.len(), self.stencils.len(), "slope vector length");
        let phi = phase.as_slice();
        let mean_diff = |pairs: &[(usize, usize)]| -> f32 {
            if pairs.is_empty() {
                return 0.0;
            }
            let sum: f64 = pairs
                .iter()
                .map(|&(a, b)| f64::from(phi[b]) - f64::from(phi[a]))
                .sum();
            (sum / pairs.len() as f64) as f32
        };

        let out = slopes.as_mut_slice();
        for (i, stencil) in self.stencils.iter().enumerate() {
            out[2 * i] = mean_diff(&stencil.x_pairs);
            out[2 * i + 1] = mean_diff(&stencil.y_pairs);
        }
    }

    /// Measure `phase` into a new slope vector.
    pub fn measure(&self, phase: &PhaseMap) -> SlopeVector {
        let mut slopes = SlopeVector::zeros(self.stencils.len());
        self.measure_into(phase, &mut slopes);
        slopes
    }
}
