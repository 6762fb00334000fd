use crate::config::CompressorConfig;

/// Stereo-linked peak compressor at the end of the output chain.
/// Tames the summation peaks of overlapping grains.
pub struct DynamicsCompressor {
    threshold_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_gain: f32,
    envelope: f32,
}

impl DynamicsCompressor {
    pub fn new(sample_rate: f32, config: &CompressorConfig) -> Self {
        Self {
            threshold_db: config.threshold_db,
            ratio: config.ratio.max(1.0),
            attack_coeff: Self::time_to_coeff(config.attack_ms, sample_rate),
            release_coeff: Self::time_to_coeff(config.release_ms, sample_rate),
            makeup_gain: Self::db_to_linear(config.makeup_gain_db),
            envelope: 0.0,
        }
    }

    #[inline]
    fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
        let clamped = time_ms.max(0.01);
        (-1.0 / (clamped * 0.001 * sample_rate)).exp()
    }

    #[inline]
    fn db_to_linear(db: f32) -> f32 {
        10.0_f32.powf(db * 0.05)
    }

    fn compute_gain(&self, level: f32) -> f32 {
        if level <= 1e-6 {
            return self.makeup_gain;
        }

        let level_db = 20.0 * level.log10();
        if level_db <= self.threshold_db {
            return self.makeup_gain;
        }

        let compressed_db = self.threshold_db + (level_db - self.threshold_db) / self.ratio;
        Self::db_to_linear(compressed_db - level_db) * self.makeup_gain
    }

    #[inline]
    fn update_envelope(&self, current: f32, input: f32) -> f32 {
        if input > current {
            input + self.attack_coeff * (current - input)
        } else {
            input + self.release_coeff * (current - input)
        }
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let detector = l.abs().max(r.abs());
            self.envelope = self.update_envelope(self.envelope, detector);
            let gain = self.compute_gain(self.envelope);
            *l *= gain;
            *r *= gain;
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signal_passes_untouched() {
        let mut comp = DynamicsCompressor::new(48_000.0, &CompressorConfig::default());
        let mut left = vec![0.05; 256];
        let mut right = vec![0.05; 256];
        comp.process(&mut left, &mut right);
        assert!(left.iter().all(|&s| (s - 0.05).abs() < 1e-6));
    }

    #[test]
    fn loud_signal_is_reduced() {
        let mut comp = DynamicsCompressor::new(48_000.0, &CompressorConfig::default());
        let mut left = vec![1.5; 4800];
        let mut right = vec![1.5; 4800];
        comp.process(&mut left, &mut right);
        let settled = *left.last().unwrap();
        assert!(settled < 1.0, "expected gain reduction, got {}", settled);
        assert!(settled > 0.0);
    }
}
