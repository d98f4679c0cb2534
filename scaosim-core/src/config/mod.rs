//! Run configuration.
//!
//! One YAML document configures all three roles. Every process of a run
//! must load the same document: the sensor geometry it describes fixes
//! the shape of every segment, and a disagreement surfaces as
//! `SchemaMismatch` at attach time.
//!
//! # Example
//!
//! ```yaml
//! segments:
//!   directory: /dev/shm/scaosim
//!   suffix: "-scaosim"
//! sensor:
//!   pupil_width: 64
//!   nsubx: 32
//! simulator:
//!   rate_hz: 500
//! reconstructor:
//!   method: zonal
//! monitor:
//!   statistic: rms
//!   max_skew_ms: 100
//! ```

mod settings;

pub use settings::{
    BackoffSettings, ExchangeSettings, MonitorSettings, ReconstructorSettings, SegmentSettings,
    SensorSettings, SimulatorSettings,
};

use crate::error::{Result, ScaoError};
use crate::geometry::SensorGeometry;
use crate::segment::{MAX_NAME_LEN, SegmentConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum configuration file size accepted by `from_file`.
pub const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

/// Complete configuration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaoConfig {
    /// Segment location and naming.
    pub segments: SegmentSettings,
    /// Exchange protocol tuning.
    pub exchange: ExchangeSettings,
    /// Sensor geometry.
    pub sensor: SensorSettings,
    /// Hardware simulator.
    pub simulator: SimulatorSettings,
    /// Reconstructor.
    pub reconstructor: ReconstructorSettings,
    /// Performance monitor.
    pub monitor: MonitorSettings,
}

impl ScaoConfig {
    /// Parse and validate a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ScaoError::ConfigParse {
            cause: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| ScaoError::ConfigIo {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;

        if metadata.len() > MAX_CONFIG_SIZE {
            return Err(ScaoError::ConfigIo {
                path: path.to_path_buf(),
                cause: format!(
                    "File is {} bytes, limit is {MAX_CONFIG_SIZE}",
                    metadata.len()
                ),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ScaoError::ConfigIo {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ScaoError::ConfigParse {
            cause: e.to_string(),
        })
    }

    /// Segment manager configuration derived from this document.
    pub fn segment_config(&self) -> SegmentConfig {
        SegmentConfig::default()
            .with_directory(&self.segments.directory)
            .with_suffix(&self.segments.suffix)
            .with_snapshot_retries(self.exchange.snapshot_retries)
    }

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let sensor = &self.sensor;
        if sensor.nsubx == 0 {
            return Err(ScaoError::config_value("sensor.nsubx", "must be positive"));
        }
        if sensor.pupil_width == 0 || sensor.pupil_width % sensor.nsubx != 0 {
            return Err(ScaoError::config_value(
                "sensor.pupil_width",
                format!(
                    "{} is not a positive multiple of nsubx = {}",
                    sensor.pupil_width, sensor.nsubx
                ),
            ));
        }
        if sensor.pupil_width / sensor.nsubx < 2 {
            return Err(ScaoError::config_value(
                "sensor.nsubx",
                "sub-apertures must be at least 2 pixels wide",
            ));
        }
        if !(sensor.illumination_threshold > 0.0 && sensor.illumination_threshold <= 1.0) {
            return Err(ScaoError::config_value(
                "sensor.illumination_threshold",
                "must be in (0, 1]",
            ));
        }
        if !(0.0..1.0).contains(&sensor.central_obscuration) {
            return Err(ScaoError::config_value(
                "sensor.central_obscuration",
                "must be in [0, 1)",
            ));
        }

        check_rate("simulator.rate_hz", self.simulator.rate_hz)?;
        check_rate("reconstructor.rate_hz", self.reconstructor.rate_hz)?;
        check_rate("monitor.rate_hz", self.monitor.rate_hz)?;

        let sim = &self.simulator;
        if !(sim.r0 > 0.0) {
            return Err(ScaoError::config_value("simulator.r0", "must be positive"));
        }
        if !(sim.diameter > 0.0) {
            return Err(ScaoError::config_value("simulator.diameter", "must be positive"));
        }
        if !(0.0..=1.0).contains(&sim.laminar) {
            return Err(ScaoError::config_value("simulator.laminar", "must be in [0, 1]"));
        }
        if sim.modes == 0 {
            return Err(ScaoError::config_value("simulator.modes", "must be positive"));
        }

        let recon = &self.reconstructor;
        if !(recon.latency_budget > 0.0) {
            return Err(ScaoError::config_value(
                "reconstructor.latency_budget",
                "must be positive",
            ));
        }
        if recon.backpressure_window == 0 {
            return Err(ScaoError::config_value(
                "reconstructor.backpressure_window",
                "must be positive",
            ));
        }

        if self.exchange.snapshot_retries == 0 {
            return Err(ScaoError::config_value(
                "exchange.snapshot_retries",
                "must be at least 1",
            ));
        }
        let backoff = &self.exchange.first_write_backoff;
        if !(backoff.factor >= 1.0) {
            return Err(ScaoError::config_value(
                "exchange.first_write_backoff.factor",
                "must be at least 1",
            ));
        }
        if backoff.initial_ms == 0 {
            return Err(ScaoError::config_value(
                "exchange.first_write_backoff.initial_ms",
                "must be at least 1",
            ));
        }
        if backoff.initial_ms > backoff.max_ms {
            return Err(ScaoError::config_value(
                "exchange.first_write_backoff.initial_ms",
                "must not exceed max_ms",
            ));
        }

        let longest = crate::exchange::Channel::ALL
            .iter()
            .map(|c| c.name().len())
            .max()
            .unwrap_or(0);
        if longest + self.segments.suffix.len() > MAX_NAME_LEN {
            return Err(ScaoError::config_value(
                "segments.suffix",
                format!("channel names with suffix must fit in {MAX_NAME_LEN} bytes"),
            ));
        }

        // Rejects thresholds that leave no valid sub-aperture.
        SensorGeometry::from_settings(&self.sensor)?;

        Ok(())
    }
}

fn check_rate(field: &str, rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(ScaoError::config_value(field, format!("{rate} is not a positive rate")));
    }
    match Duration::try_from_secs_f64(1.0 / rate) {
        Ok(period) if !period.is_zero() => Ok(()),
        _ => Err(ScaoError::config_value(
            field,
            format!("{rate} Hz has no representable non-zero period"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResidualStatistic;
    use crate::reconstruct::ReconstructorMethod;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = ScaoConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sensor.subwidth(), 2);
        assert_eq!(config.simulator.period(), Duration::from_millis(2));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = ScaoConfig::from_yaml(
            r#"
sensor:
  pupil_width: 32
  nsubx: 8
reconstructor:
  method: tip_tilt
monitor:
  statistic: piston_removed_rms
  max_skew_ms: 50
"#,
        )
        .unwrap();
        assert_eq!(config.sensor.pupil_width, 32);
        assert_eq!(config.sensor.nsubx, 8);
        assert_eq!(config.sensor.illumination_threshold, 0.5);
        assert_eq!(config.reconstructor.method, ReconstructorMethod::TipTilt);
        assert_eq!(config.monitor.statistic, ResidualStatistic::PistonRemovedRms);
        assert_eq!(config.monitor.max_skew(), Some(Duration::from_millis(50)));
        assert_eq!(config.simulator.seed, 1234);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ScaoConfig::from_yaml("sensr:\n  nsubx: 4\n").unwrap_err();
        assert!(matches!(err, ScaoError::ConfigParse { .. }));
    }

    #[test]
    fn indivisible_pupil_is_rejected() {
        let err = ScaoConfig::from_yaml("sensor:\n  pupil_width: 30\n  nsubx: 8\n").unwrap_err();
        assert!(matches!(err, ScaoError::ConfigValue { ref field, .. } if field == "sensor.pupil_width"));
    }

    #[test]
    fn single_pixel_subapertures_are_rejected() {
        let err = ScaoConfig::from_yaml("sensor:\n  pupil_width: 16\n  nsubx: 16\n").unwrap_err();
        assert!(matches!(err, ScaoError::ConfigValue { ref field, .. } if field == "sensor.nsubx"));
    }

    #[test]
    fn bad_rates_are_rejected() {
        assert!(ScaoConfig::from_yaml("monitor:\n  rate_hz: 0\n").is_err());
        assert!(ScaoConfig::from_yaml("simulator:\n  rate_hz: -5\n").is_err());
    }

    #[test]
    fn rates_without_a_usable_period_are_rejected() {
        // 1e-300 Hz overflows Duration; 1e300 Hz rounds to a zero period.
        for rate in ["1.0e-300", "1.0e300"] {
            let err = ScaoConfig::from_yaml(&format!("simulator:\n  rate_hz: {rate}\n"))
                .unwrap_err();
            assert!(err.is_config_error(), "{rate}: {err}");
            assert!(err.to_string().contains("simulator.rate_hz"), "{err}");
        }
        ScaoConfig::from_yaml("monitor:\n  rate_hz: 0.001\n").unwrap();
    }

    #[test]
    fn zero_initial_backoff_is_rejected() {
        let yaml = "exchange:\n  first_write_backoff:\n    initial_ms: 0\n";
        let err = ScaoConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("initial_ms"), "{err}");
    }

    #[test]
    fn long_suffix_is_rejected() {
        let err = ScaoConfig::from_yaml("segments:\n  suffix: \"-this-suffix-is-far-too-long\"\n")
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn yaml_roundtrip() {
        let config = ScaoConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(ScaoConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "simulator:\n  seed: 42\n").unwrap();
        assert_eq!(ScaoConfig::from_file(&path).unwrap().simulator.seed, 42);

        assert!(matches!(
            ScaoConfig::from_file(&dir.path().join("missing.yaml")),
            Err(ScaoError::ConfigIo { .. })
        ));
    }

    #[test]
    fn segment_config_carries_suffix() {
        let config = ScaoConfig::default();
        let segments = config.segment_config();
        assert!(
            segments
                .path_for("slopes")
                .ends_with("slopes-scaosim.shm")
        );
        assert_eq!(segments.snapshot_retries, 64);
    }
}
