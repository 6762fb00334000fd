//! Tempo and pitch independent playback for music practice.
//!
//! [`PlaybackController`] is the entry point: load a [`SourceBuffer`], drive
//! [`PlaybackController::process`] from the audio callback and receive position and
//! loop notifications through a [`PlaybackObserver`].

pub mod buffer;
pub mod clock;
pub mod config;
pub mod controller;
pub mod dsp;
pub mod error;
pub mod granular;
pub mod observer;
pub mod params;
pub mod quality;
pub mod render;
pub mod scheduler;
pub mod standard;
pub mod wav;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

pub use buffer::SourceBuffer;
pub use clock::{AudioClock, SharedTickTimer, SystemTimer, TickTimer};
pub use config::{CompressorConfig, EngineConfig};
pub use controller::{select_path, PathKind, PlaybackController, SessionState, Transport};
pub use error::{EngineError, Result};
pub use granular::{EngineEvent, GranularEngine, GranularParams};
pub use observer::{BoxedObserver, EventLog, NullObserver, PlaybackEvent, PlaybackObserver};
pub use params::{LoopPointKind, LoopRegion};
pub use quality::{AdaptiveThresholds, QualityTier, TierSettings, WindowType};
