//! Lookahead scheduling: a control-rate timer that queues audio a short window ahead
//! of the output clock. `tick_cadence < lookahead` must hold or output gaps appear.

use crate::quality::TierSettings;

#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    cadence: f64,
    lookahead: f64,
    next_tick_at: Option<f64>,
}

impl LookaheadScheduler {
    pub fn new(settings: &TierSettings) -> Self {
        Self {
            cadence: settings.tick_cadence,
            lookahead: settings.lookahead,
            next_tick_at: None,
        }
    }

    pub fn cadence(&self) -> f64 {
        self.cadence
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Apply new tier timing; the pending tick keeps its due time.
    pub fn retune(&mut self, settings: &TierSettings) {
        self.cadence = settings.tick_cadence;
        self.lookahead = settings.lookahead;
    }

    /// Arm the timer with an immediate first tick.
    pub fn start(&mut self, now: f64) {
        self.next_tick_at = Some(now);
    }

    pub fn cancel(&mut self) {
        self.next_tick_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_tick_at.is_some()
    }

    pub fn next_tick_at(&self) -> Option<f64> {
        self.next_tick_at
    }

    pub fn is_due(&self, now: f64) -> bool {
        self.next_tick_at.is_some_and(|at| now >= at)
    }

    /// Latest output time a tick at `now` should fill up to.
    pub fn horizon(&self, now: f64) -> f64 {
        now + self.lookahead
    }

    /// Re-arm after a tick ran at `now`.
    pub fn complete_tick(&mut self, now: f64) {
        if self.next_tick_at.is_some() {
            self.next_tick_at = Some(now + self.cadence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityTier;

    #[test]
    fn first_tick_is_immediate_then_follows_cadence() {
        let mut scheduler = LookaheadScheduler::new(&QualityTier::Medium.settings());
        assert!(!scheduler.is_due(0.0));
        scheduler.start(1.0);
        assert!(scheduler.is_due(1.0));
        scheduler.complete_tick(1.0);
        assert!(!scheduler.is_due(1.02));
        assert!(scheduler.is_due(1.031));
        assert!((scheduler.horizon(1.0) - 1.15).abs() < 1e-12);
    }

    #[test]
    fn cancel_drops_the_pending_tick() {
        let mut scheduler = LookaheadScheduler::new(&QualityTier::Low.settings());
        scheduler.start(0.0);
        scheduler.cancel();
        assert!(!scheduler.is_due(10.0));
        scheduler.complete_tick(10.0);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn retune_switches_tier_timing() {
        let mut scheduler = LookaheadScheduler::new(&QualityTier::Low.settings());
        scheduler.retune(&QualityTier::High.settings());
        assert_eq!(scheduler.cadence(), 0.020);
        assert_eq!(scheduler.lookahead(), 0.200);
    }
}
