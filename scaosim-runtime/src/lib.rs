//! scaosim runtime: the role processes.
//!
//! This crate provides what runs on top of the exchange in `scaosim-core`:
//! - Role loops for the hardware simulator, reconstructor and monitor
//! - A synthetic turbulence screen and Shack-Hartmann sensor
//! - Logging setup shared by every role process

#![warn(missing_docs)]

pub mod observability;
pub mod optics;
pub mod roles;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::observability::{LogFormat, TracingConfig, TracingGuard, init_tracing};
    pub use crate::optics::{PhaseScreen, ShackHartmann};
    pub use crate::roles::{
        HardwareSimulator, PerformanceMonitor, ReconstructorRole, RoleControl, RoleStatus,
        RunOptions,
    };
}
