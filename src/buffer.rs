use crate::error::{EngineError, Result};

/// Decoded PCM supplied by the host. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    /// Sample data (interleaved if stereo: [L, R, L, R, ...])
    samples: Vec<f32>,
    /// Number of channels (1 = mono, 2 = stereo)
    channels: usize,
    /// Sample rate the buffer was decoded at
    sample_rate: f32,
}

impl SourceBuffer {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: f32) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            return Err(EngineError::InvalidConfig(format!(
                "unsupported channel count {}",
                channels
            )));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "invalid buffer sample rate {}",
                sample_rate
            )));
        }
        if samples.len() < channels {
            return Err(EngineError::EmptyBuffer);
        }

        let mut samples = samples;
        // Drop a dangling partial frame.
        samples.truncate(samples.len() - samples.len() % channels);

        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: f32) -> Result<Self> {
        Self::new(samples, 1, sample_rate)
    }

    /// Build an interleaved stereo buffer from separate channel slices.
    pub fn from_planar(left: &[f32], right: &[f32], sample_rate: f32) -> Result<Self> {
        let frames = left.len().min(right.len());
        let mut samples = Vec::with_capacity(frames * 2);
        for (l, r) in left.iter().zip(right.iter()) {
            samples.push(*l);
            samples.push(*r);
        }
        Self::new(samples, 2, sample_rate)
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn seconds_to_frames(&self, seconds: f64) -> f64 {
        seconds * self.sample_rate as f64
    }

    #[inline]
    pub fn frames_to_seconds(&self, frames: f64) -> f64 {
        frames / self.sample_rate as f64
    }

    /// Linearly interpolated frame at a fractional position.
    /// Returns (left, right); mono buffers return the same value twice.
    /// Positions outside the buffer read as silence.
    #[inline]
    pub fn frame_at(&self, position: f64) -> (f32, f32) {
        let frame_count = self.frames();
        if position < 0.0 || position >= frame_count as f64 {
            return (0.0, 0.0);
        }

        let index = position.floor() as usize;
        let frac = (position - index as f64) as f32;
        let next_index = (index + 1).min(frame_count - 1);

        if self.channels == 1 {
            let s1 = self.samples[index];
            let s2 = self.samples[next_index];
            let value = s1 + (s2 - s1) * frac;
            (value, value)
        } else {
            let left1 = self.samples[index * 2];
            let right1 = self.samples[index * 2 + 1];
            let left2 = self.samples[next_index * 2];
            let right2 = self.samples[next_index * 2 + 1];
            (
                left1 + (left2 - left1) * frac,
                right1 + (right2 - right1) * frac,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn duration_counts_frames_not_samples() {
        let buffer = SourceBuffer::new(vec![0.0; 96_000], 2, 48_000.0).unwrap();
        assert_eq!(buffer.frames(), 48_000);
        assert_relative_eq!(buffer.duration(), 1.0);
    }

    #[test]
    fn interpolates_between_frames() {
        let buffer = SourceBuffer::mono(vec![0.0, 1.0, 0.0], 100.0).unwrap();
        let (l, r) = buffer.frame_at(0.5);
        assert_relative_eq!(l, 0.5);
        assert_relative_eq!(r, 0.5);
        assert_eq!(buffer.frame_at(3.5), (0.0, 0.0));
        assert_eq!(buffer.frame_at(-0.1), (0.0, 0.0));
    }

    #[test]
    fn planar_input_is_interleaved() {
        let buffer = SourceBuffer::from_planar(&[1.0, 2.0], &[-1.0, -2.0], 10.0).unwrap();
        assert_eq!(buffer.frame_at(1.0), (2.0, -2.0));
    }

    #[test]
    fn rejects_empty_and_odd_layouts() {
        assert!(matches!(
            SourceBuffer::mono(Vec::new(), 44_100.0),
            Err(EngineError::EmptyBuffer)
        ));
        assert!(SourceBuffer::new(vec![0.0; 8], 3, 44_100.0).is_err());
        assert!(SourceBuffer::mono(vec![0.0; 8], 0.0).is_err());
    }
}
