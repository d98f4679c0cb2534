//! Segment identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one incarnation of a shared segment.
///
/// Written into the header when the segment is created. A segment that
/// is released and created again gets a new id, which lets a process
/// holding an old mapping tell that it is looking at a dead region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(Uuid);

impl SegmentId {
    /// Create a new random segment ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a segment ID from raw header bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw bytes as stored in the header.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip() {
        let id = SegmentId::new();
        assert_eq!(SegmentId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(SegmentId::new(), SegmentId::new());
    }

    #[test]
    fn display_prefix() {
        assert!(SegmentId::new().to_string().starts_with("seg_"));
    }

    #[test]
    fn serializes_as_plain_uuid() {
        let id = SegmentId::new();
        let yaml = serde_yaml::to_string(&id).unwrap();
        assert_eq!(yaml.trim(), id.as_uuid().to_string());
        assert_eq!(serde_yaml::from_str::<SegmentId>(&yaml).unwrap(), id);
    }
}
