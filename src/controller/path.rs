use std::fmt;

use serde::{Deserialize, Serialize};

use crate::granular::{EngineEvent, GranularEngine};
use crate::render::OutputBus;
use crate::standard::StandardPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Standard,
    Granular,
}

impl PathKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PathKind::Standard => "standard",
            PathKind::Granular => "granular",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granular resynthesis is needed for any pitch shift, or for a tempo change that must keep pitch.
pub fn select_path(playback_rate: f64, pitch_shift: f64, preserve_pitch: bool) -> PathKind {
    if pitch_shift != 0.0 || (preserve_pitch && playback_rate != 1.0) {
        PathKind::Granular
    } else {
        PathKind::Standard
    }
}

/// Whichever path is live. There is never more than one.
pub(crate) enum PlaybackPath {
    Standard(StandardPath),
    Granular(Box<GranularEngine>),
}

impl PlaybackPath {
    pub(crate) fn kind(&self) -> PathKind {
        match self {
            PlaybackPath::Standard(_) => PathKind::Standard,
            PlaybackPath::Granular(_) => PathKind::Granular,
        }
    }

    pub(crate) fn current_time(&self, now: f64) -> f64 {
        match self {
            PlaybackPath::Standard(path) => path.current_time(now),
            PlaybackPath::Granular(engine) => engine.current_time(now),
        }
    }

    /// Fade out whatever is sounding and release the path's scheduling. Returns engine events
    /// that were already audible but not yet delivered.
    pub(crate) fn teardown(&mut self, bus: &mut OutputBus, now: f64, fade: f64) -> Vec<EngineEvent> {
        match self {
            PlaybackPath::Standard(path) => {
                path.stop(bus, now, fade);
                Vec::new()
            }
            PlaybackPath::Granular(engine) => engine.stop(now, bus, fade),
        }
    }
}
