/// Fraction of accumulated drift fed back into each grain's read position.
/// Tuned by ear; not derived from phase-vocoder theory.
pub const PHASE_CORRECTION: f64 = 0.1;

/// Tracks how far each grain's internal reader runs ahead of (or behind) the
/// next grain's onset, and offsets read positions to soften inter-grain cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseAccumulator {
    drift: f64,
}

impl PhaseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drift(&self) -> f64 {
        self.drift
    }

    pub fn reset(&mut self) {
        self.drift = 0.0;
    }

    /// Advance by one grain and return the read offset (seconds) for it.
    ///
    /// Over `spacing` output seconds a grain reads `spacing * pitch_factor` source
    /// seconds while the read pointer only moves `spacing * playback_rate`. Drift
    /// is kept within half a grain either side.
    pub fn advance(&mut self, spacing: f64, playback_rate: f64, pitch_factor: f64, grain_duration: f64) -> f64 {
        self.drift += spacing * (pitch_factor - playback_rate);
        let half = grain_duration * 0.5;
        if half > 0.0 {
            self.drift = (self.drift + half).rem_euclid(grain_duration) - half;
        }
        self.drift * PHASE_CORRECTION
    }
}
