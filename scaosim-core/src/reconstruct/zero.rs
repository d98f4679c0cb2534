use super::{Reconstructor, check_input};
use crate::error::Result;
use crate::geometry::SensorGeometry;
use crate::payload::{PhaseMap, SlopeVector};
use std::sync::Arc;

/// Always returns a flat phase map.
#[derive(Debug, Clone)]
pub struct ZeroReconstructor {
    geometry: Arc<SensorGeometry>,
}

impl ZeroReconstructor {
    /// Create for `geometry`.
    pub fn new(geometry: Arc<SensorGeometry>) -> Self {
        Self { geometry }
    }
}

impl Reconstructor for ZeroReconstructor {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn reconstruct(&self, slopes: &SlopeVector) -> Result<PhaseMap> {
        check_input(&self.geometry, slopes)?;
        Ok(self.geometry.zero_phase())
    }
}
