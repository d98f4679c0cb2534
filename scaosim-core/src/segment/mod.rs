//! Named, fixed-shape shared memory segments.
//!
//! Each segment is a memory-mapped file holding exactly one sample of one
//! channel: the latest one. Writers overwrite it in place; readers copy it
//! out and validate the copy against a sequence counter, so no lock is
//! ever taken on the data path.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (128 bytes, little-endian, immutable after creation)  │
//! │   magic · version · dtype · order · ndim · dims[4]           │
//! │   payload_len · segment_id · created_at · name               │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Control block (one cache line)                               │
//! │   sequence: AtomicU64   = 2 × generation (+1 while writing)  │
//! │   timestamp: AtomicU64  = monotonic ns of the latest sample  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (payload_len bytes, row-major)                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! The first `create_or_attach` creates and zero-fills the file, which
//! reads as generation 0 ("unwritten"). Later attaches validate the header
//! against the requested schema. Files persist until an operator calls
//! `release`; a stopped writer simply freezes its channel.

mod header;
mod region;

pub use header::{
    HEADER_SIZE, MAX_NAME_LEN, PAYLOAD_OFFSET, SEGMENT_MAGIC, SEGMENT_VERSION, SegmentHeader,
};
pub use region::{
    DEFAULT_SNAPSHOT_RETRIES, SampleMeta, Segment, SegmentConfig, SegmentReader, SegmentSpec,
    SegmentStatus, SegmentWriter, default_directory,
};
