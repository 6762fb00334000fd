mod compressor;
mod envelope;
mod filter;
mod window;

pub use compressor::DynamicsCompressor;
pub use envelope::{grain_envelope, GainAutomation, RAMP_STEPS};
pub use filter::{LowpassBiquad, StereoLowpass};
pub use window::WindowCache;
