//! Reconstruction contract and methods.
//!
//! A [`Reconstructor`] maps one slope vector to one phase map of the
//! configured grid shape. Implementations are pure functions of their
//! input and the static geometry they were built with: `reconstruct`
//! takes `&self` and no state survives between calls.
//!
//! Slopes are mean phase gradients in microns per pixel, x along grid
//! columns and y along grid rows, one pair per valid sub-aperture in
//! row-major order.

mod latency;
mod tip_tilt;
mod zero;
mod zonal;

pub use latency::{LatencyMonitor, LatencyTransition};
pub use tip_tilt::TipTiltReconstructor;
pub use zero::ZeroReconstructor;
pub use zonal::ZonalReconstructor;

use crate::config::ReconstructorSettings;
use crate::error::{Result, ScaoError};
use crate::geometry::SensorGeometry;
use crate::payload::{PhaseMap, SlopeVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Slope vector to phase map.
pub trait Reconstructor: Send + Sync {
    /// Method name for logs.
    fn name(&self) -> &'static str;

    /// Estimate the phase behind `slopes`.
    ///
    /// Fails with `ReconstructionInput` if the slope count does not match
    /// the geometry.
    fn reconstruct(&self, slopes: &SlopeVector) -> Result<PhaseMap>;
}

/// Selectable reconstruction method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructorMethod {
    /// Constant zero phase.
    Zero,
    /// Global tip/tilt plane.
    TipTilt,
    /// Southwell zonal least squares.
    #[default]
    Zonal,
}

impl ReconstructorMethod {
    /// Build a reconstructor for `geometry`.
    pub fn build(
        self,
        geometry: Arc<SensorGeometry>,
        settings: &ReconstructorSettings,
    ) -> Box<dyn Reconstructor> {
        match self {
            Self::Zero => Box::new(ZeroReconstructor::new(geometry)),
            Self::TipTilt => Box::new(TipTiltReconstructor::new(geometry)),
            Self::Zonal => Box::new(ZonalReconstructor::new(geometry, settings.iterations)),
        }
    }

    /// Config name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::TipTilt => "tip_tilt",
            Self::Zonal => "zonal",
        }
    }
}

impl fmt::Display for ReconstructorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn check_input(geometry: &SensorGeometry, slopes: &SlopeVector) -> Result<()> {
    if slopes.len() != geometry.n_valid() {
        return Err(ScaoError::ReconstructionInput {
            cause: format!(
                "{} slope pairs for {} valid sub-apertures",
                slopes.len(),
                geometry.n_valid()
            ),
        });
    }
    Ok(())
}

/// Subtract the mean over the pupil and zero everything outside it.
pub(crate) fn remove_piston(map: &mut PhaseMap, pupil: &[bool]) {
    let (sum, count) = map
        .as_slice()
        .iter()
        .zip(pupil)
        .filter(|(_, p)| **p)
        .fold((0.0f64, 0usize), |(s, n), (&v, _)| (s + f64::from(v), n + 1));
    let mean = if count == 0 { 0.0 } else { (sum / count as f64) as f32 };
    for (v, &p) in map.as_mut_slice().iter_mut().zip(pupil) {
        *v = if p { *v - mean } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorSettings;

    pub(crate) fn small_geometry() -> Arc<SensorGeometry> {
        Arc::new(
            SensorGeometry::from_settings(&SensorSettings {
                pupil_width: 16,
                nsubx: 4,
                ..SensorSettings::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn method_names() {
        let yaml = serde_yaml::to_string(&ReconstructorMethod::TipTilt).unwrap();
        assert_eq!(yaml.trim(), "tip_tilt");
        let parsed: ReconstructorMethod = serde_yaml::from_str("zonal").unwrap();
        assert_eq!(parsed, ReconstructorMethod::Zonal);
        assert_eq!(ReconstructorMethod::default(), ReconstructorMethod::Zonal);
    }

    #[test]
    fn every_method_accepts_zero_slopes() {
        let geometry = small_geometry();
        let settings = ReconstructorSettings::default();
        let slopes = SlopeVector::zeros(geometry.n_valid());
        for method in [
            ReconstructorMethod::Zero,
            ReconstructorMethod::TipTilt,
            ReconstructorMethod::Zonal,
        ] {
            let recon = method.build(Arc::clone(&geometry), &settings);
            assert_eq!(recon.name(), method.as_str());
            let phase = recon.reconstruct(&slopes).unwrap();
            assert_eq!(phase.rows(), 16);
            assert!(phase.as_slice().iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn wrong_slope_count_is_rejected() {
        let geometry = small_geometry();
        let recon = ReconstructorMethod::Zonal.build(geometry, &ReconstructorSettings::default());
        let err = recon.reconstruct(&SlopeVector::zeros(1)).unwrap_err();
        assert!(matches!(err, ScaoError::ReconstructionInput { .. }));
    }

    #[test]
    fn piston_removal() {
        let mut map = PhaseMap::from_vec(1, 4, vec![1.0, 2.0, 3.0, 100.0]).unwrap();
        remove_piston(&mut map, &[true, true, true, false]);
        assert_eq!(map.as_slice(), &[-1.0, 0.0, 1.0, 0.0]);
    }
}
