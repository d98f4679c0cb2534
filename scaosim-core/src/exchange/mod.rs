//! Exchange protocol between the three roles.
//!
//! Each [`Channel`] is one segment with exactly one writer role. Writers
//! hold a [`Publisher`], readers a [`Subscriber`]; both are typed by the
//! [`Payload`](crate::payload::Payload) they carry. Reads never block the
//! writer: a reader that races a publish retries, and a reader that
//! arrives before the first publish polls with [`Backoff`] until data
//! appears.
//!
//! Generations are per channel. Nothing relates generation 5 of `slopes`
//! to generation 5 of `true_phase`; cross-channel alignment uses the
//! publish timestamps.

mod backoff;
mod channel;

pub use backoff::Backoff;
pub use channel::{Publisher, Sample, Subscriber};

use crate::geometry::SensorGeometry;
use crate::segment::SegmentSpec;
use crate::types::{DType, Shape};
use std::fmt;

/// The role that owns a channel or consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Produces turbulence and slopes.
    HardwareSimulator,
    /// Turns slopes into a phase estimate.
    Reconstructor,
    /// Compares the estimate with the truth.
    PerformanceMonitor,
}

impl Role {
    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::HardwareSimulator => "simulator",
            Self::Reconstructor => "reconstructor",
            Self::PerformanceMonitor => "monitor",
        }
    }

    /// Channels this role publishes.
    pub fn writes(self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| c.writer_role() == self)
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named segment of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Slope vector, `(n_valid, 2)` f32.
    Slopes,
    /// Ground-truth phase, `(w, w)` f32.
    TruePhase,
    /// Reconstructed phase, `(w, w)` f32.
    ReconstructedPhase,
    /// Valid sub-aperture map, `(nsubx, nsubx)` u8.
    ValidSubapertures,
}

impl Channel {
    /// Every channel, in creation order.
    pub const ALL: [Channel; 4] = [
        Channel::Slopes,
        Channel::TruePhase,
        Channel::ReconstructedPhase,
        Channel::ValidSubapertures,
    ];

    /// Segment name (before the suffix).
    pub fn name(self) -> &'static str {
        match self {
            Self::Slopes => "slopes",
            Self::TruePhase => "true_phase",
            Self::ReconstructedPhase => "reconstructed_phase",
            Self::ValidSubapertures => "valid_subaps",
        }
    }

    /// Parse a segment name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// The only role allowed to publish on this channel.
    pub fn writer_role(self) -> Role {
        match self {
            Self::Slopes | Self::TruePhase | Self::ValidSubapertures => Role::HardwareSimulator,
            Self::ReconstructedPhase => Role::Reconstructor,
        }
    }

    /// Element type.
    pub fn dtype(self) -> DType {
        match self {
            Self::ValidSubapertures => DType::U8,
            _ => DType::F32,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shapes of all channels for one sensor geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    /// `(n_valid, 2)`.
    pub slopes: Shape,
    /// `(w, w)`, shared by both phase channels.
    pub phase: Shape,
    /// `(nsubx, nsubx)`.
    pub valid_subapertures: Shape,
}

impl ChannelLayout {
    /// Layout implied by a sensor geometry.
    pub fn from_geometry(geometry: &SensorGeometry) -> Self {
        Self {
            slopes: geometry.slopes_shape(),
            phase: geometry.phase_shape(),
            valid_subapertures: geometry.mask_shape(),
        }
    }

    /// Shape of one channel.
    pub fn shape(&self, channel: Channel) -> Shape {
        match channel {
            Channel::Slopes => self.slopes,
            Channel::TruePhase | Channel::ReconstructedPhase => self.phase,
            Channel::ValidSubapertures => self.valid_subapertures,
        }
    }

    /// Segment spec of one channel.
    pub fn spec(&self, channel: Channel) -> SegmentSpec {
        SegmentSpec::new(channel.name(), self.shape(channel), channel.dtype())
    }
}
