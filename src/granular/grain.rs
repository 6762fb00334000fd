use std::sync::Arc;

use crate::buffer::SourceBuffer;
use crate::dsp::{grain_envelope, StereoLowpass, WindowCache};
use crate::error::{EngineError, Result};
use crate::quality::{TierSettings, WindowType};
use crate::render::{VoiceLoop, VoiceSpec};

/// Lowpass cutoff at unity pitch.
pub const BASE_GRAIN_CUTOFF_HZ: f64 = 16_000.0;
pub const MIN_GRAIN_CUTOFF_HZ: f64 = 1_000.0;

/// Cutoff falls as the grain is sped up, hiding resampling artifacts.
pub fn grain_cutoff(pitch_factor: f64, output_rate: f32) -> f32 {
    let nyquist_guard = 0.45 * output_rate as f64;
    (BASE_GRAIN_CUTOFF_HZ / pitch_factor.max(1e-3))
        .max(MIN_GRAIN_CUTOFF_HZ)
        .min(nyquist_guard) as f32
}

/// One windowed fragment of the source, described in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grain {
    /// Output clock time the grain starts sounding.
    pub start_time: f64,
    /// Source read offset.
    pub offset: f64,
    /// Output duration.
    pub duration: f64,
    pub pitch_factor: f64,
    pub window: WindowType,
    pub cutoff: f32,
}

impl Grain {
    /// A grain of the tier's length read from `offset`, shortened so its last read stays inside
    /// the source. Fails when the offset is outside the source or less than one crossfade of
    /// output would remain.
    pub fn fit(
        start_time: f64,
        offset: f64,
        pitch_factor: f64,
        settings: &TierSettings,
        source_duration: f64,
        output_rate: f32,
    ) -> Result<Self> {
        let out_of_range = EngineError::GrainOutOfRange {
            offset,
            duration: source_duration,
        };
        if !(0.0..source_duration).contains(&offset) {
            return Err(out_of_range);
        }
        let remaining = (source_duration - offset) / pitch_factor;
        let duration = settings.grain_duration.min(remaining);
        if duration < settings.crossfade {
            return Err(out_of_range);
        }
        Ok(Self {
            start_time,
            offset,
            duration,
            pitch_factor,
            window: settings.window,
            cutoff: grain_cutoff(pitch_factor, output_rate),
        })
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub(crate) fn to_voice(
        &self,
        buffer: &Arc<SourceBuffer>,
        output_rate: f32,
        settings: &TierSettings,
        windows: &mut WindowCache,
    ) -> VoiceSpec {
        let rate = output_rate as f64;
        let start_frame = (self.start_time * rate).round() as u64;
        let length = ((self.duration * rate).round() as u64).max(2);
        let fade = (settings.crossfade * rate).round() as u64;
        // Shortened grains reuse the full-length table; the envelope only samples its shape.
        let table_len = ((settings.grain_duration * rate).round() as usize).max(2);
        let table = windows.get(table_len, self.window);

        VoiceSpec {
            buffer: Arc::clone(buffer),
            start_frame,
            read_position: buffer.seconds_to_frames(self.offset),
            step: self.pitch_factor * buffer.sample_rate() as f64 / rate,
            length: Some(length),
            looping: VoiceLoop::Off,
            gain: grain_envelope(&table, start_frame, length, fade, settings.grain_gain()),
            filter: Some(StereoLowpass::new(output_rate, self.cutoff)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityTier;
    use crate::render::{Voice, VoiceEvent, VoiceId};

    #[test]
    fn cutoff_is_inverse_to_pitch() {
        let up = grain_cutoff(2.0, 48_000.0);
        let unity = grain_cutoff(1.0, 48_000.0);
        let down = grain_cutoff(0.5, 48_000.0);
        assert!(up < unity);
        assert!(unity <= down);
        assert!(down <= 0.45 * 48_000.0);
        assert!(grain_cutoff(100.0, 48_000.0) >= MIN_GRAIN_CUTOFF_HZ as f32);
    }

    #[test]
    fn cutoff_survives_low_output_rates() {
        assert!(grain_cutoff(1.0, 1_000.0) <= 450.0);
    }

    #[test]
    fn voice_reads_at_pitch_factor() {
        let buffer = Arc::new(SourceBuffer::mono(vec![0.0; 48_000], 24_000.0).unwrap());
        let settings = QualityTier::Low.settings();
        let grain = Grain {
            start_time: 0.5,
            offset: 0.25,
            duration: settings.grain_duration,
            pitch_factor: 2.0,
            window: settings.window,
            cutoff: 8_000.0,
        };
        let spec = grain.to_voice(&buffer, 48_000.0, &settings, &mut WindowCache::new());
        assert_eq!(spec.start_frame, 24_000);
        assert_eq!(spec.length, Some(4_800));
        assert!((spec.read_position - 6_000.0).abs() < 1e-9);
        assert!((spec.step - 1.0).abs() < 1e-12);
    }

    #[test]
    fn grain_near_the_end_is_shortened_to_fit() {
        let settings = QualityTier::Medium.settings();
        let grain = Grain::fit(0.0, 0.95, 2.0, &settings, 1.0, 1_000.0).unwrap();
        assert!((grain.duration - 0.025).abs() < 1e-12);
        assert!(grain.offset + grain.duration * grain.pitch_factor <= 1.0 + 1e-12);

        let full = Grain::fit(0.0, 0.5, 2.0, &settings, 1.0, 1_000.0).unwrap();
        assert_eq!(full.duration, settings.grain_duration);
    }

    #[test]
    fn grain_without_enough_source_is_rejected() {
        let settings = QualityTier::Medium.settings();
        assert!(matches!(
            Grain::fit(0.0, 0.99, 2.0, &settings, 1.0, 1_000.0),
            Err(EngineError::GrainOutOfRange { .. })
        ));
        assert!(Grain::fit(0.0, 1.0, 1.0, &settings, 1.0, 1_000.0).is_err());
        assert!(Grain::fit(0.0, -0.1, 1.0, &settings, 1.0, 1_000.0).is_err());
    }

    #[test]
    fn shortened_grain_fades_out_before_the_source_ends() {
        let buffer = Arc::new(SourceBuffer::mono(vec![0.5; 1_000], 1_000.0).unwrap());
        let settings = QualityTier::Medium.settings();
        let grain = Grain::fit(0.0, 0.95, 2.0, &settings, buffer.duration(), 1_000.0).unwrap();
        let mut spec = grain.to_voice(&buffer, 1_000.0, &settings, &mut WindowCache::new());
        spec.filter = None;
        let length = spec.length.unwrap();

        let mut voice = Voice::new(VoiceId(1), spec);
        let (mut l, mut r) = (vec![0.0; 64], vec![0.0; 64]);
        let mut events = Vec::new();
        voice.render_into(0, &mut l, &mut r, &mut events);

        // The voice runs its full length instead of hitting the end of the source.
        assert_eq!(
            events,
            vec![VoiceEvent::Ended {
                voice: VoiceId(1),
                frame: length
            }]
        );
        let peak = l.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.0);
        assert!(l[length as usize - 1].abs() < 0.3 * peak);
    }
}
