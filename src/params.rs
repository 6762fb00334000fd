use serde::{Deserialize, Serialize};

pub const MIN_PLAYBACK_RATE: f64 = 0.5;
pub const MAX_PLAYBACK_RATE: f64 = 1.5;
pub const MIN_PITCH_SEMITONES: f64 = -12.0;
pub const MAX_PITCH_SEMITONES: f64 = 12.0;
pub const PITCH_STEP_SEMITONES: f64 = 0.5;

pub fn clamp_playback_rate(rate: f64) -> f64 {
    if !rate.is_finite() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Clamp to [-12, 12] and snap to the nearest half semitone.
pub fn clamp_pitch_shift(semitones: f64) -> f64 {
    if !semitones.is_finite() {
        return 0.0;
    }
    let snapped = (semitones / PITCH_STEP_SEMITONES).round() * PITCH_STEP_SEMITONES;
    // Avoid carrying -0.0 into identity checks.
    (snapped + 0.0).clamp(MIN_PITCH_SEMITONES, MAX_PITCH_SEMITONES)
}

/// Per-grain internal rate for a shift in semitones.
#[inline]
pub fn pitch_factor(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Which bound `set_loop_point` captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPointKind {
    Start,
    End,
}

impl std::str::FromStr for LoopPointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(LoopPointKind::Start),
            "end" => Ok(LoopPointKind::End),
            other => Err(format!("unknown loop point '{}'", other)),
        }
    }
}

/// A loop region in source seconds. Always `end > start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRegion {
    start: f64,
    end: f64,
}

impl LoopRegion {
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start.is_finite() && end.is_finite() && start >= 0.0 && end > start {
            Some(Self { start, end })
        } else {
            None
        }
    }

    #[inline]
    pub fn start(&self) -> f64 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> f64 {
        self.end
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// `loopStart + ((t - loopStart) mod loopLength)` once `t` has entered the loop.
    pub fn fold(&self, t: f64) -> f64 {
        if t < self.start {
            return t;
        }
        self.start + (t - self.start).rem_euclid(self.length())
    }

    /// Position to resume from; starting at or past the end restarts the loop.
    pub fn entry_point(&self, t: f64) -> f64 {
        if t >= self.end {
            self.start
        } else {
            t
        }
    }
}
