//! Prelude for convenient imports.
//!
//! # Example
//!
//! ```ignore
//! use scaosim_core::prelude::*;
//! ```

// Core types
pub use crate::types::{DType, ElementOrder, Generation, SegmentId, Shape, Timestamp};

// Error handling
pub use crate::error::{Result, ScaoError};

// Segments
pub use crate::segment::{
    SampleMeta, Segment, SegmentConfig, SegmentReader, SegmentSpec, SegmentStatus, SegmentWriter,
};

// Exchange
pub use crate::exchange::{Backoff, Channel, ChannelLayout, Publisher, Role, Sample, Subscriber};
pub use crate::payload::{Payload, PhaseMap, SlopeVector, SubapertureMask};

// Configuration and geometry
pub use crate::config::ScaoConfig;
pub use crate::geometry::SensorGeometry;

// Reconstruction and monitoring
pub use crate::aggregate::{
    AggregatorState, PerformanceAggregator, ResidualReport, ResidualStatistic,
};
pub use crate::reconstruct::{LatencyMonitor, LatencyTransition, Reconstructor, ReconstructorMethod};

// Time
pub use crate::clock::{ClockProvider, MockClock, MonotonicClock};
