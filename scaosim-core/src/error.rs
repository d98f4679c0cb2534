//! Error types for scaosim.
//!
//! Every failure mode of the exchange carries the identifying context a
//! reader needs to act on it: the segment path, the channel, the expected
//! and actual layouts. Codes are stable and grouped by subsystem.

use crate::types::{DType, Generation, Shape};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for scaosim operations.
#[derive(Error, Debug)]
pub enum ScaoError {
    // =========================================================================
    // Segment Errors (E001-E099)
    // =========================================================================
    /// Failed to create or open a segment file.
    #[error("E001: Failed to create segment at {path}: {cause}")]
    SegmentCreate {
        /// The path where segment creation failed.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Failed to memory-map a segment file.
    #[error("E002: Failed to mmap segment at {path}: {cause}")]
    SegmentMmap {
        /// The path of the segment file.
        path: PathBuf,
        /// Reason for the mmap failure.
        cause: String,
    },

    /// The segment exists with a different shape or dtype.
    #[error(
        "E003: Schema mismatch for segment '{channel}' at {path}: \
         expected {expected_dtype}{expected_shape}, found {found_dtype}{found_shape}"
    )]
    SchemaMismatch {
        /// Channel name.
        channel: String,
        /// The segment file.
        path: PathBuf,
        /// Shape requested by this process.
        expected_shape: Shape,
        /// Dtype requested by this process.
        expected_dtype: DType,
        /// Shape recorded in the segment header.
        found_shape: Shape,
        /// Dtype recorded in the segment header.
        found_dtype: DType,
    },

    /// The segment header is unreadable or inconsistent.
    #[error("E004: Segment corruption detected at {path}: {cause}")]
    SegmentCorruption {
        /// The segment file.
        path: PathBuf,
        /// Description of the corruption.
        cause: String,
    },

    /// Segment not found (inspect/release only; attach creates).
    #[error("E005: Segment '{channel}' not found at {path}")]
    SegmentNotFound {
        /// Channel name.
        channel: String,
        /// The expected segment file.
        path: PathBuf,
    },

    /// Failed to remove a segment file.
    #[error("E006: Failed to release segment at {path}: {cause}")]
    SegmentRelease {
        /// The segment file.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Exchange Errors (E100-E199)
    // =========================================================================
    /// No sample has been published on the channel yet.
    #[error("E101: Channel '{channel}' has not been written yet")]
    NotYetWritten {
        /// Channel name.
        channel: String,
    },

    /// Every snapshot attempt raced with a publish.
    #[error("E102: Stale read on channel '{channel}' after {attempts} attempts")]
    StaleRead {
        /// Channel name.
        channel: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A payload does not have the shape fixed for its segment.
    #[error(
        "E103: Payload for channel '{channel}' has shape {actual}, segment expects {expected}"
    )]
    ShapeMismatch {
        /// Channel name.
        channel: String,
        /// Shape of the segment.
        expected: Shape,
        /// Shape of the rejected payload.
        actual: Shape,
    },

    /// Payload bytes could not be decoded.
    #[error("E104: Failed to decode payload on channel '{channel}': {cause}")]
    PayloadDecode {
        /// Channel name.
        channel: String,
        /// Reason for the failure.
        cause: String,
    },

    /// The published sensor geometry differs from the locally derived one.
    #[error("E105: Sensor geometry mismatch on channel '{channel}' (generation {generation}): {cause}")]
    GeometryMismatch {
        /// Channel name.
        channel: String,
        /// Generation of the published geometry.
        generation: Generation,
        /// Description of the difference.
        cause: String,
    },

    /// Raw payload bytes do not fill the segment exactly.
    #[error("E107: Payload for channel '{channel}' is {actual} bytes, segment holds {expected}")]
    PayloadSize {
        /// Channel name.
        channel: String,
        /// Segment payload length.
        expected: usize,
        /// Length of the rejected buffer.
        actual: usize,
    },

    /// Waiting for the first write was cancelled.
    #[error("E106: Gave up waiting for first write on channel '{channel}' after {waited:?}")]
    FirstWriteTimeout {
        /// Channel name.
        channel: String,
        /// How long the caller waited.
        waited: Duration,
    },

    // =========================================================================
    // Reconstruction Errors (E200-E299)
    // =========================================================================
    /// Reconstruction latency exceeds the sensing cycle budget.
    #[error(
        "E201: Backpressure: mean reconstruction latency {mean:?} exceeds budget {budget:?} \
         over {window} cycles"
    )]
    Backpressure {
        /// Moving mean of recent reconstruction latencies.
        mean: Duration,
        /// Allowed latency per cycle.
        budget: Duration,
        /// Number of cycles in the averaging window.
        window: usize,
    },

    /// Reconstructor input does not match its configured geometry.
    #[error("E202: Reconstruction input rejected: {cause}")]
    ReconstructionInput {
        /// Description of the mismatch.
        cause: String,
    },

    // =========================================================================
    // Configuration Errors (E300-E399)
    // =========================================================================
    /// Configuration file could not be read.
    #[error("E301: Failed to read config {path}: {cause}")]
    ConfigIo {
        /// Path to the configuration file.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Configuration YAML could not be parsed.
    #[error("E302: Failed to parse config: {cause}")]
    ConfigParse {
        /// Parser message.
        cause: String,
    },

    /// A configuration value is out of range.
    #[error("E303: Invalid config value for '{field}': {cause}")]
    ConfigValue {
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        cause: String,
    },
}

impl ScaoError {
    /// Get the error code (e.g., "E003").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SegmentCreate { .. } => "E001",
            Self::SegmentMmap { .. } => "E002",
            Self::SchemaMismatch { .. } => "E003",
            Self::SegmentCorruption { .. } => "E004",
            Self::SegmentNotFound { .. } => "E005",
            Self::SegmentRelease { .. } => "E006",
            Self::NotYetWritten { .. } => "E101",
            Self::StaleRead { .. } => "E102",
            Self::ShapeMismatch { .. } => "E103",
            Self::PayloadDecode { .. } => "E104",
            Self::GeometryMismatch { .. } => "E105",
            Self::FirstWriteTimeout { .. } => "E106",
            Self::PayloadSize { .. } => "E107",
            Self::Backpressure { .. } => "E201",
            Self::ReconstructionInput { .. } => "E202",
            Self::ConfigIo { .. } => "E301",
            Self::ConfigParse { .. } => "E302",
            Self::ConfigValue { .. } => "E303",
        }
    }

    /// Conditions that are expected during normal operation and are
    /// handled by polling or retrying the cycle.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotYetWritten { .. } | Self::StaleRead { .. })
    }

    /// Conditions after which a role must exit rather than continue
    /// against memory it would misinterpret.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. }
                | Self::SegmentCorruption { .. }
                | Self::GeometryMismatch { .. }
                | Self::SegmentCreate { .. }
                | Self::SegmentMmap { .. }
        )
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigIo { .. } | Self::ConfigParse { .. } | Self::ConfigValue { .. }
        )
    }

    pub(crate) fn config_value(field: &str, cause: impl Into<String>) -> Self {
        Self::ConfigValue {
            field: field.to_string(),
            cause: cause.into(),
        }
    }
}

/// Result type alias using `ScaoError`.
pub type Result<T> = std::result::Result<T, ScaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_correct() {
        let err = ScaoError::SegmentCreate {
            path: PathBuf::from("/tmp/test"),
            cause: "test".to_string(),
        };
        assert_eq!(err.code(), "E001");

        let err = ScaoError::StaleRead {
            channel: "slopes".to_string(),
            attempts: 8,
        };
        assert_eq!(err.code(), "E102");
    }

    #[test]
    fn schema_mismatch_display() {
        let err = ScaoError::SchemaMismatch {
            channel: "slopes".to_string(),
            path: PathBuf::from("/dev/shm/scaosim/slopes.shm"),
            expected_shape: Shape::new(&[50, 2]),
            expected_dtype: DType::F32,
            found_shape: Shape::new(&[100, 2]),
            found_dtype: DType::F32,
        };
        let msg = err.to_string();
        assert!(msg.contains("E003"));
        assert!(msg.contains("f32(50, 2)"));
        assert!(msg.contains("f32(100, 2)"));
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_errors() {
        assert!(
            ScaoError::NotYetWritten {
                channel: "true_phase".to_string()
            }
            .is_transient()
        );

        assert!(
            !ScaoError::Backpressure {
                mean: Duration::from_millis(12),
                budget: Duration::from_millis(5),
                window: 32,
            }
            .is_transient()
        );
    }

    #[test]
    fn backpressure_is_not_fatal() {
        let err = ScaoError::Backpressure {
            mean: Duration::from_millis(12),
            budget: Duration::from_millis(5),
            window: 32,
        };
        assert!(!err.is_fatal());
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn config_errors() {
        assert!(ScaoError::config_value("sensor.nsubx", "must divide pupil_width").is_config_error());
        assert!(
            !ScaoError::NotYetWritten {
                channel: "slopes".to_string()
            }
            .is_config_error()
        );
    }
}
