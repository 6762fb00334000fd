use serde::{Deserialize, Serialize};

/// Grain window shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowType {
    Hann,
    Blackman,
}

/// Named bundle of granular constants traded against scheduling cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl Default for QualityTier {
    fn default() -> Self {
        QualityTier::Medium
    }
}

/// Constants for one quality tier. Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierSettings {
    pub grain_duration: f64,
    pub overlap: f64,
    pub window: WindowType,
    pub lookahead: f64,
    pub tick_cadence: f64,
    pub max_grains_per_tick: usize,
    pub crossfade: f64,
    pub phase_coherence: bool,
}

const LOW: TierSettings = TierSettings {
    grain_duration: 0.100,
    overlap: 0.50,
    window: WindowType::Hann,
    lookahead: 0.100,
    tick_cadence: 0.050,
    max_grains_per_tick: 4,
    crossfade: 0.015,
    phase_coherence: false,
};

const MEDIUM: TierSettings = TierSettings {
    grain_duration: 0.080,
    overlap: 0.60,
    window: WindowType::Hann,
    lookahead: 0.150,
    tick_cadence: 0.030,
    max_grains_per_tick: 8,
    crossfade: 0.020,
    phase_coherence: false,
};

const HIGH: TierSettings = TierSettings {
    grain_duration: 0.060,
    overlap: 0.70,
    window: WindowType::Blackman,
    lookahead: 0.200,
    tick_cadence: 0.020,
    max_grains_per_tick: 12,
    crossfade: 0.025,
    phase_coherence: true,
};

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Low, QualityTier::Medium, QualityTier::High];

    pub fn settings(self) -> TierSettings {
        match self {
            QualityTier::Low => LOW,
            QualityTier::Medium => MEDIUM,
            QualityTier::High => HIGH,
        }
    }

    /// One step down; `Low` stays `Low`.
    pub fn lower(self) -> Self {
        match self {
            QualityTier::High => QualityTier::Medium,
            QualityTier::Medium | QualityTier::Low => QualityTier::Low,
        }
    }

    /// One step up; `High` stays `High`.
    pub fn higher(self) -> Self {
        match self {
            QualityTier::Low => QualityTier::Medium,
            QualityTier::Medium | QualityTier::High => QualityTier::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(format!("unknown quality mode '{}'", other)),
        }
    }
}

impl TierSettings {
    /// Output-time distance between grain onsets.
    #[inline]
    pub fn grain_spacing(&self, playback_rate: f64) -> f64 {
        self.grain_duration * (1.0 - self.overlap) / playback_rate
    }

    /// Overlap-add normalization so summed plateaus stay near unity.
    #[inline]
    pub fn grain_gain(&self) -> f32 {
        (1.0 - self.overlap) as f32
    }
}
