//! Static sensor geometry: pupil and valid sub-apertures.
//!
//! Every role derives the geometry from the same [`SensorSettings`], so
//! all of them agree on the slope vector length without exchanging it.
//! The simulator still publishes its mask on `valid_subaps` so the
//! reconstructor can verify the agreement at start-up.

use crate::config::SensorSettings;
use crate::error::{Result, ScaoError};
use crate::payload::{PhaseMap, SubapertureMask};
use crate::types::Shape;

/// Filled circle of diameter `width` pixels, optionally obscured.
///
/// A pixel is inside when its centre lies within `width / 2` of the grid
/// centre and outside `obscuration * width / 2`.
pub fn circular_pupil(width: usize, obscuration: f64) -> Vec<bool> {
    let centre = (width as f64 - 1.0) / 2.0;
    let outer = width as f64 / 2.0;
    let inner = obscuration * outer;
    let mut mask = Vec::with_capacity(width * width);
    for row in 0..width {
        for col in 0..width {
            let dy = row as f64 - centre;
            let dx = col as f64 - centre;
            let r = (dx * dx + dy * dy).sqrt();
            mask.push(r <= outer && r >= inner);
        }
    }
    mask
}

/// Pupil, sub-aperture grid and derived shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorGeometry {
    pupil_width: usize,
    nsubx: usize,
    subwidth: usize,
    pupil: Vec<bool>,
    valid: SubapertureMask,
    /// Illuminated fraction of each sub-aperture, row-major.
    illumination: Vec<f64>,
}

impl SensorGeometry {
    /// Derive the geometry from sensor settings.
    ///
    /// Fails if `pupil_width` is not a multiple of `nsubx` or if no
    /// sub-aperture reaches the illumination threshold.
    pub fn from_settings(settings: &SensorSettings) -> Result<Self> {
        let SensorSettings {
            pupil_width,
            nsubx,
            illumination_threshold,
            central_obscuration,
        } = *settings;

        if nsubx == 0 || pupil_width == 0 || pupil_width % nsubx != 0 {
            return Err(ScaoError::config_value(
                "sensor.pupil_width",
                format!("{pupil_width} is not a positive multiple of nsubx = {nsubx}"),
            ));
        }
        let subwidth = pupil_width / nsubx;
        let pupil = circular_pupil(pupil_width, central_obscuration);

        let area = (subwidth * subwidth) as f64;
        let mut illumination = Vec::with_capacity(nsubx * nsubx);
        for sy in 0..nsubx {
            for sx in 0..nsubx {
                let lit = (0..subwidth)
                    .flat_map(|dy| (0..subwidth).map(move |dx| (dy, dx)))
                    .filter(|&(dy, dx)| {
                        pupil[(sy * subwidth + dy) * pupil_width + sx * subwidth + dx]
                    })
                    .count();
                illumination.push(lit as f64 / area);
            }
        }

        let valid = SubapertureMask::new(
            nsubx,
            illumination
                .iter()
                .map(|&f| f >= illumination_threshold)
                .collect(),
        );

        if valid.count_valid() == 0 {
            return Err(ScaoError::config_value(
                "sensor.illumination_threshold",
                format!("no sub-aperture is at least {illumination_threshold} illuminated"),
            ));
        }

        Ok(Self {
            pupil_width,
            nsubx,
            subwidth,
            pupil,
            valid,
            illumination,
        })
    }

    /// Phase grid width in pixels.
    pub fn pupil_width(&self) -> usize {
        self.pupil_width
    }

    /// Sub-apertures across the diameter.
    pub fn nsubx(&self) -> usize {
        self.nsubx
    }

    /// Pixels across one sub-aperture.
    pub fn subwidth(&self) -> usize {
        self.subwidth
    }

    /// Row-major pupil mask over the phase grid.
    pub fn pupil(&self) -> &[bool] {
        &self.pupil
    }

    /// Number of illuminated pixels.
    pub fn pupil_pixels(&self) -> usize {
        self.pupil.iter().filter(|&&p| p).count()
    }

    /// Valid sub-aperture mask.
    pub fn valid_subapertures(&self) -> &SubapertureMask {
        &self.valid
    }

    /// Illuminated fraction of sub-aperture (row, col).
    pub fn illumination(&self, row: usize, col: usize) -> f64 {
        self.illumination[row * self.nsubx + col]
    }

    /// Number of valid sub-apertures.
    pub fn n_valid(&self) -> usize {
        self.valid.count_valid()
    }

    /// Shape of the slope vector, `(n_valid, 2)`.
    pub fn slopes_shape(&self) -> Shape {
        Shape::matrix(self.n_valid(), 2)
    }

    /// Shape of both phase maps.
    pub fn phase_shape(&self) -> Shape {
        Shape::matrix(self.pupil_width, self.pupil_width)
    }

    /// Shape of the sub-aperture mask.
    pub fn mask_shape(&self) -> Shape {
        Shape::matrix(self.nsubx, self.nsubx)
    }

    /// Zero phase map of the configured shape.
    pub fn zero_phase(&self) -> PhaseMap {
        PhaseMap::zeros(self.pupil_width, self.pupil_width)
    }

    /// Compare a published mask with the locally derived one.
    pub fn check_published_mask(&self, published: &SubapertureMask) -> std::result::Result<(), String> {
        if published.nsubx() != self.nsubx {
            return Err(format!(
                "published mask is {0}×{0}, expected {1}×{1}",
                published.nsubx(),
                self.nsubx
            ));
        }
        if published != &self.valid {
            let differing = published
                .as_slice()
                .iter()
                .zip(self.valid.as_slice())
                .filter(|(a, b)| a != b)
                .count();
            return Err(format!(
                "{differing} sub-apertures differ ({} valid published, {} derived)",
                published.count_valid(),
                self.n_valid()
            ));
        }
        Ok(())
    }
}
