//! Configuration sections.

use crate::aggregate::ResidualStatistic;
use crate::exchange::Backoff;
use crate::reconstruct::ReconstructorMethod;
use crate::segment::{DEFAULT_SNAPSHOT_RETRIES, default_directory};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where the shared segments live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    /// Directory holding segment files.
    pub directory: PathBuf,
    /// Suffix appended to every channel name.
    pub suffix: String,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            suffix: "-scaosim".to_string(),
        }
    }
}

/// Exchange protocol tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Snapshot attempts before a read is reported stale.
    #[serde(default = "default_snapshot_retries")]
    pub snapshot_retries: u32,

    /// Poll backoff while waiting for a channel's first write.
    pub first_write_backoff: BackoffSettings,

    /// Give up waiting for a first write after this long (unset: wait forever).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_write_timeout_ms: Option<u64>,
}

fn default_snapshot_retries() -> u32 {
    DEFAULT_SNAPSHOT_RETRIES
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            snapshot_retries: default_snapshot_retries(),
            first_write_backoff: BackoffSettings::default(),
            first_write_timeout_ms: None,
        }
    }
}

impl ExchangeSettings {
    /// First-write timeout as a duration.
    pub fn first_write_timeout(&self) -> Option<Duration> {
        self.first_write_timeout_ms.map(Duration::from_millis)
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// First delay in milliseconds.
    pub initial_ms: u64,
    /// Delay cap in milliseconds.
    pub max_ms: u64,
    /// Growth factor per attempt.
    pub factor: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_ms: 1,
            max_ms: 250,
            factor: 2.0,
        }
    }
}

impl BackoffSettings {
    /// Build the backoff policy.
    pub fn to_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_ms),
            Duration::from_millis(self.max_ms),
            self.factor,
        )
    }
}

/// Wavefront sensor geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Phase grid width in pixels; the grid is `pupil_width × pupil_width`.
    pub pupil_width: usize,
    /// Sub-apertures across the diameter.
    pub nsubx: usize,
    /// Minimum illuminated fraction for a sub-aperture to be valid.
    pub illumination_threshold: f64,
    /// Central obscuration as a fraction of the pupil diameter.
    pub central_obscuration: f64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            pupil_width: 64,
            nsubx: 32,
            illumination_threshold: 0.5,
            central_obscuration: 0.0,
        }
    }
}

impl SensorSettings {
    /// Pixels across one sub-aperture.
    pub fn subwidth(&self) -> usize {
        self.pupil_width / self.nsubx.max(1)
    }
}

/// Hardware simulator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Sensing cycle rate.
    pub rate_hz: f64,
    /// RNG seed for the phase screen.
    pub seed: u64,
    /// Fried parameter in metres at 0.5 µm.
    pub r0: f64,
    /// Wind velocity [x, y] in m/s.
    pub wind: [f64; 2],
    /// Telescope diameter in metres.
    pub diameter: f64,
    /// AR(1) coefficient of the mode amplitudes per step.
    pub laminar: f64,
    /// Number of Fourier modes in the screen.
    pub modes: usize,
    /// Emit a status line every this many milliseconds.
    pub status_interval_ms: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            rate_hz: 500.0,
            seed: 1234,
            r0: 0.2,
            wind: [10.0, 20.0],
            diameter: 8.0,
            laminar: 0.999,
            modes: 24,
            status_interval_ms: 1000,
        }
    }
}

impl SimulatorSettings {
    /// Sensing cycle period.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

/// Reconstructor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructorSettings {
    /// Loop rate.
    pub rate_hz: f64,
    /// Reconstruction method.
    pub method: ReconstructorMethod,
    /// Jacobi sweeps for the zonal method.
    pub iterations: usize,
    /// Allowed mean latency as a fraction of the sensing cycle period.
    pub latency_budget: f64,
    /// Cycles averaged before backpressure is declared.
    pub backpressure_window: usize,
    /// Emit a status line every this many milliseconds.
    pub status_interval_ms: u64,
}

impl Default for ReconstructorSettings {
    fn default() -> Self {
        Self {
            rate_hz: 100.0,
            method: ReconstructorMethod::Zonal,
            iterations: 200,
            latency_budget: 0.5,
            backpressure_window: 32,
            status_interval_ms: 1000,
        }
    }
}

impl ReconstructorSettings {
    /// Loop period.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

/// Performance monitor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Loop rate.
    pub rate_hz: f64,
    /// Residual statistic.
    pub statistic: ResidualStatistic,
    /// Flag reports whose truth and reconstruction stamps differ by more.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_skew_ms: Option<u64>,
    /// Emit a status line every this many milliseconds.
    pub status_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            rate_hz: 30.0,
            statistic: ResidualStatistic::Rms,
            max_skew_ms: None,
            status_interval_ms: 1000,
        }
    }
}

impl MonitorSettings {
    /// Loop period.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }

    /// Skew bound as a duration.
    pub fn max_skew(&self) -> Option<Duration> {
        self.max_skew_ms.map(Duration::from_millis)
    }
}
