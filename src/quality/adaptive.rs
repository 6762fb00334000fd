//! Adaptive quality: a running average of tick cost and a pure tier transition.

use serde::{Deserialize, Serialize};

use super::QualityTier;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdaptiveThresholds {
    /// Ticks averaged before each decision.
    pub window_ticks: usize,
    /// Lower the tier when the average tick cost exceeds this.
    pub downgrade_above_ms: f64,
    /// Raise the tier when the average tick cost is below this.
    pub upgrade_below_ms: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            window_ticks: 100,
            downgrade_above_ms: 4.0,
            upgrade_below_ms: 1.0,
        }
    }
}

/// Transition function over one averaged sample. Never moves more than one step.
pub fn next_tier(current: QualityTier, average_ms: f64, thresholds: &AdaptiveThresholds) -> QualityTier {
    if average_ms > thresholds.downgrade_above_ms {
        current.lower()
    } else if average_ms < thresholds.upgrade_below_ms {
        current.higher()
    } else {
        current
    }
}

/// Collects tick costs and yields a tier decision once per window.
#[derive(Debug, Clone)]
pub struct QualityMonitor {
    thresholds: AdaptiveThresholds,
    sum_ms: f64,
    ticks: usize,
}

impl QualityMonitor {
    pub fn new(thresholds: AdaptiveThresholds) -> Self {
        Self {
            thresholds,
            sum_ms: 0.0,
            ticks: 0,
        }
    }

    pub fn reset(&mut self) {
        self.sum_ms = 0.0;
        self.ticks = 0;
    }

    /// Record one tick. Returns the new tier at the end of a window if it changed.
    pub fn record(&mut self, cost_ms: f64, current: QualityTier) -> Option<QualityTier> {
        self.sum_ms += cost_ms.max(0.0);
        self.ticks += 1;
        if self.ticks < self.thresholds.window_ticks.max(1) {
            return None;
        }

        let average = self.sum_ms / self.ticks as f64;
        self.reset();
        let next = next_tier(current, average, &self.thresholds);
        (next != current).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(monitor: &mut QualityMonitor, cost: f64, tier: QualityTier, ticks: usize) -> Option<QualityTier> {
        let mut result = None;
        for _ in 0..ticks {
            if let Some(next) = monitor.record(cost, tier) {
                result = Some(next);
            }
        }
        result
    }

    #[test]
    fn sustained_overload_drops_exactly_one_tier() {
        let mut monitor = QualityMonitor::new(AdaptiveThresholds::default());
        assert_eq!(
            feed(&mut monitor, 10.0, QualityTier::High, 100),
            Some(QualityTier::Medium)
        );
    }

    #[test]
    fn no_decision_before_window_fills() {
        let mut monitor = QualityMonitor::new(AdaptiveThresholds::default());
        assert_eq!(feed(&mut monitor, 10.0, QualityTier::High, 99), None);
    }

    #[test]
    fn cheap_ticks_raise_the_tier() {
        let mut monitor = QualityMonitor::new(AdaptiveThresholds::default());
        assert_eq!(
            feed(&mut monitor, 0.1, QualityTier::Low, 100),
            Some(QualityTier::Medium)
        );
    }

    #[test]
    fn hysteresis_band_holds_the_tier() {
        let thresholds = AdaptiveThresholds::default();
        assert_eq!(next_tier(QualityTier::Medium, 2.0, &thresholds), QualityTier::Medium);
        assert_eq!(next_tier(QualityTier::Low, 50.0, &thresholds), QualityTier::Low);
        assert_eq!(next_tier(QualityTier::High, 0.0, &thresholds), QualityTier::High);
    }
}
