use super::{Reconstructor, check_input, remove_piston};
use crate::error::Result;
use crate::geometry::SensorGeometry;
use crate::payload::{PhaseMap, SlopeVector};
use std::sync::Arc;

/// Least-squares global tip/tilt.
///
/// The best-fit plane to uniform-weight gradient measurements has the
/// mean slopes as its gradient.
#[derive(Debug, Clone)]
pub struct TipTiltReconstructor {
    geometry: Arc<SensorGeometry>,
}

impl TipTiltReconstructor {
    /// Create for `geometry`.
    pub fn new(geometry: Arc<SensorGeometry>) -> Self {
        Self { geometry }
    }

    /// Mean (x, y) slope.
    pub fn fit(slopes: &SlopeVector) -> (f64, f64) {
        if slopes.is_empty() {
            return (0.0, 0.0);
        }
        let (sx, sy) = slopes
            .pairs()
            .fold((0.0f64, 0.0f64), |(ax, ay), [x, y]| {
                (ax + f64::from(x), ay + f64::from(y))
            });
        let n = slopes.len() as f64;
        (sx / n, sy / n)
    }
}

impl Reconstructor for TipTiltReconstructor {
    fn name(&self) -> &'static str {
        "tip_tilt"
    }

    fn reconstruct(&self, slopes: &SlopeVector) -> Result<PhaseMap> {
        check_input(&self.geometry, slopes)?;
        let (tip, tilt) = Self::fit(slopes);

        let width = self.geometry.pupil_width();
        let centre = (width as f64 - 1.0) / 2.0;
        let mut map = self.geometry.zero_phase();
        for row in 0..width {
            for col in 0..width {
                let value = tip * (col as f64 - centre) + tilt * (row as f64 - centre);
                map.set(row, col, value as f32);
            }
        }
        remove_piston(&mut map, self.geometry.pupil());
        Ok(map)
    }
}
