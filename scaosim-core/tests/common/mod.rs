//! Common test utilities for integration tests.

#![allow(dead_code)]

use scaosim_core::exchange::ChannelLayout;
use scaosim_core::segment::SegmentConfig;
use scaosim_core::types::Shape;
use tempfile::TempDir;

/// Segment configuration rooted in a fresh temporary directory.
///
/// The directory is removed when the returned guard drops.
pub fn test_segment_config() -> (TempDir, SegmentConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = SegmentConfig::default()
        .with_directory(dir.path())
        .with_suffix("-test");
    (dir, config)
}

/// 100 sub-apertures on a 64 × 64 grid.
pub fn scenario_layout() -> ChannelLayout {
    ChannelLayout {
        slopes: Shape::matrix(100, 2),
        phase: Shape::matrix(64, 64),
        valid_subapertures: Shape::matrix(32, 32),
    }
}

/// Payload whose every 8-byte word carries `generation`.
pub fn pattern(generation: u64, words: usize) -> Vec<u8> {
    generation.to_le_bytes().repeat(words)
}

/// Check a payload written by [`pattern`] and return its generation.
pub fn decode_pattern(bytes: &[u8]) -> Option<u64> {
    let mut words = bytes.chunks_exact(8).map(|c| {
        let mut w = [0u8; 8];
        w.copy_from_slice(c);
        u64::from_le_bytes(w)
    });
    let first = words.next()?;
    words.all(|w| w == first).then_some(first)
}
