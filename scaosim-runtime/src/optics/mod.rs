//! Synthetic optics for the hardware simulator.
//!
//! A [`PhaseScreen`] evolves a turbulent wavefront and a
//! [`ShackHartmann`] sensor turns it into slopes. Both are simple models
//! meant to drive the exchange with realistic data rates and shapes, not
//! to be physically faithful.

mod screen;
mod wfs;

pub use screen::{PhaseScreen, ScreenMode};
pub use wfs::ShackHartmann;
