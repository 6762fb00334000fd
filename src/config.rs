use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::quality::{AdaptiveThresholds, QualityTier};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorConfig {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_gain_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 4.0,
            attack_ms: 3.0,
            release_ms: 150.0,
            makeup_gain_db: 0.0,
        }
    }
}

/// Engine configuration, usually supplied by the host as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub quality_mode: QualityTier,
    pub adaptive_quality: bool,
    pub preserve_pitch: bool,
    pub output_gain: f32,
    /// Fade applied to in-flight audio when a path is torn down.
    pub stop_fade_ms: f32,
    pub compressor: CompressorConfig,
    pub adaptive: AdaptiveThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality_mode: QualityTier::Medium,
            adaptive_quality: true,
            preserve_pitch: true,
            output_gain: 1.0,
            stop_fade_ms: 30.0,
            compressor: CompressorConfig::default(),
            adaptive: AdaptiveThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if !(0.0..=1.0).contains(&self.output_gain) {
            return invalid(format!("outputGain {} outside [0, 1]", self.output_gain));
        }
        if !self.stop_fade_ms.is_finite() || !(0.0..=1000.0).contains(&self.stop_fade_ms) {
            return invalid(format!("stopFadeMs {} outside [0, 1000]", self.stop_fade_ms));
        }
        let c = &self.compressor;
        if !c.threshold_db.is_finite() || c.threshold_db > 0.0 {
            return invalid(format!("compressor thresholdDb {} must be <= 0", c.threshold_db));
        }
        if !c.ratio.is_finite() || c.ratio < 1.0 {
            return invalid(format!("compressor ratio {} must be >= 1", c.ratio));
        }
        if !(c.attack_ms > 0.0 && c.release_ms > 0.0) {
            return invalid("compressor attack and release must be positive".to_string());
        }
        let a = &self.adaptive;
        if a.window_ticks == 0 {
            return invalid("adaptive windowTicks must be positive".to_string());
        }
        if !(a.upgrade_below_ms >= 0.0 && a.upgrade_below_ms < a.downgrade_above_ms) {
            return invalid(format!(
                "adaptive thresholds need 0 <= upgradeBelowMs ({}) < downgradeAboveMs ({})",
                a.upgrade_below_ms, a.downgrade_above_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "qualityMode": "high", "adaptiveQuality": false }"#)
                .unwrap();
        assert_eq!(config.quality_mode, QualityTier::High);
        assert!(!config.adaptive_quality);
        assert!(config.preserve_pitch);
        assert_eq!(config.adaptive.window_ticks, 100);
    }

    #[test]
    fn nested_sections_use_camel_case() {
        let config = EngineConfig::from_json(
            r#"{ "compressor": { "thresholdDb": -12.0 }, "adaptive": { "downgradeAboveMs": 6.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.compressor.threshold_db, -12.0);
        assert_eq!(config.compressor.ratio, 4.0);
        assert_eq!(config.adaptive.downgrade_above_ms, 6.0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "outputGain": 3.0 }"#),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "adaptive": { "upgradeBelowMs": 9.0 } }"#),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(EngineError::Json(_))
        ));
    }

    #[test]
    fn json_round_trip_preserves_config() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
