//! scaosim core library
//!
//! Shared-memory data exchange and reconstruction contract for a
//! three-process adaptive-optics control loop.
//!
//! # Overview
//!
//! A hardware simulator publishes wavefront slopes and the true phase, a
//! reconstructor turns the slopes into a phase estimate, and a
//! performance monitor compares estimate and truth. The three processes
//! never call each other: they meet only in named shared-memory
//! segments, each holding the latest sample of one channel.
//!
//! # Key Components
//!
//! - **Segment**: memory-mapped, fixed-shape region with a seqlock-style
//!   generation counter; atomic publish and torn-free snapshot
//! - **Exchange**: typed single-writer/multi-reader channels and the
//!   first-write handshake
//! - **Reconstruct**: the `Reconstructor` contract, its methods and the
//!   latency monitor
//! - **Aggregate**: pairing of truth and reconstruction into residual
//!   reports
//!
//! # Example
//!
//! ```ignore
//! use scaosim_core::prelude::*;
//!
//! let config = ScaoConfig::from_file(Path::new("run.yaml"))?;
//! let geometry = SensorGeometry::from_settings(&config.sensor)?;
//! let layout = ChannelLayout::from_geometry(&geometry);
//!
//! let mut slopes = Subscriber::<SlopeVector>::open(Channel::Slopes, &layout, &config.segment_config())?;
//! let first = slopes.wait_for_first_write(&config.exchange.first_write_backoff.to_backoff(), None).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod geometry;
pub mod payload;
pub mod prelude;
pub mod reconstruct;
pub mod segment;
pub mod types;

// Re-export key types at crate root for convenience
pub use aggregate::{PerformanceAggregator, ResidualReport, ResidualStatistic};
pub use config::ScaoConfig;
pub use error::{Result, ScaoError};
pub use exchange::{Channel, ChannelLayout, Publisher, Role, Sample, Subscriber};
pub use geometry::SensorGeometry;
pub use payload::{Payload, PhaseMap, SlopeVector, SubapertureMask};
pub use reconstruct::{Reconstructor, ReconstructorMethod};
pub use segment::{Segment, SegmentConfig, SegmentSpec};
pub use types::{DType, Generation, SegmentId, Shape, Timestamp};
