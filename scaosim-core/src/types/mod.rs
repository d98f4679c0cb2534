//! Core types for scaosim.
//!
//! - `Generation`: per-channel version counter of the latest sample
//! - `Timestamp`: monotonic clock reading attached to a sample
//! - `SegmentId`: identity of one incarnation of a shared segment
//! - `Shape` / `DType` / `ElementOrder`: the self-describing array schema

mod generation;
mod ids;
mod shape;

pub use generation::{Generation, Timestamp};
pub use ids::SegmentId;
pub use shape::{DType, ElementOrder, MAX_DIMS, Shape};
