//! Common test utilities for role tests.

#![allow(dead_code)]

use scaosim_core::config::ScaoConfig;
use tempfile::TempDir;

/// Small fast configuration with segments in a fresh temporary directory.
///
/// 16 × 16 pupil with 4 × 4 sub-apertures, all loops at 1 kHz.
pub fn test_config() -> (TempDir, ScaoConfig) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ScaoConfig::default();
    config.segments.directory = dir.path().to_path_buf();
    config.segments.suffix = "-test".to_string();
    config.sensor.pupil_width = 16;
    config.sensor.nsubx = 4;
    config.simulator.rate_hz = 1000.0;
    config.simulator.modes = 8;
    config.reconstructor.rate_hz = 1000.0;
    config.reconstructor.iterations = 50;
    config.monitor.rate_hz = 1000.0;
    config.validate().unwrap();
    (dir, config)
}
