mod adaptive;
mod tier;

pub use adaptive::{next_tier, AdaptiveThresholds, QualityMonitor};
pub use tier::{QualityTier, TierSettings, WindowType};
