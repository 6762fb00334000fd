//! Granular pitch/time engine.
//!
//! Pitch comes from each grain's internal playback rate; tempo comes from grain spacing
//! and how far the source read pointer moves per grain.

mod engine;
mod grain;
mod phase;

pub use engine::{EngineEvent, GranularEngine, GranularParams, GRAIN_RECLAIM_MARGIN};
pub use grain::{grain_cutoff, Grain, BASE_GRAIN_CUTOFF_HZ, MIN_GRAIN_CUTOFF_HZ};
pub use phase::{PhaseAccumulator, PHASE_CORRECTION};
