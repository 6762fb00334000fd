//! Piecewise-linear gain automation on the output clock.

/// Number of discrete ramp steps used to approximate a window edge.
pub const RAMP_STEPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    frame: u64,
    value: f32,
}

/// Gain curve made of linear ramps between breakpoints.
/// Before the first breakpoint the first value holds; after the last, the last value holds.
#[derive(Debug, Clone, PartialEq)]
pub struct GainAutomation {
    points: Vec<Breakpoint>,
    // Index of the segment the last lookup landed in; lookups are mostly sequential.
    cursor: usize,
}

impl GainAutomation {
    pub fn constant(value: f32) -> Self {
        Self {
            points: vec![Breakpoint { frame: 0, value }],
            cursor: 0,
        }
    }

    /// Append a linear ramp reaching `value` at `frame`. Frames must not go backwards.
    pub fn ramp_to(&mut self, frame: u64, value: f32) {
        let frame = self
            .points
            .last()
            .map_or(frame, |last| frame.max(last.frame));
        self.points.push(Breakpoint { frame, value });
    }

    pub fn set_at(&mut self, frame: u64, value: f32) {
        self.cancel_after(frame);
        self.points.push(Breakpoint { frame, value });
    }

    /// Drop automation after `frame` and hold the value the curve had there.
    pub fn cancel_after(&mut self, frame: u64) {
        let held = self.value_at(frame);
        self.points.retain(|p| p.frame < frame);
        self.points.push(Breakpoint { frame, value: held });
        self.cursor = 0;
    }

    /// Ramp from the current value at `frame` to silence over `duration` frames.
    pub fn fade_out(&mut self, frame: u64, duration: u64) {
        self.cancel_after(frame);
        self.points.push(Breakpoint {
            frame: frame + duration.max(1),
            value: 0.0,
        });
    }

    pub fn end_frame(&self) -> u64 {
        self.points.last().map_or(0, |p| p.frame)
    }

    pub fn value_at(&mut self, frame: u64) -> f32 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        if frame <= first.frame {
            return first.value;
        }
        let last = self.points[self.points.len() - 1];
        if frame >= last.frame {
            return last.value;
        }

        if self.cursor >= self.points.len() - 1 || self.points[self.cursor].frame > frame {
            self.cursor = 0;
        }
        while self.points[self.cursor + 1].frame <= frame {
            self.cursor += 1;
        }

        let a = self.points[self.cursor];
        let b = self.points[self.cursor + 1];
        let span = (b.frame - a.frame) as f32;
        if span <= 0.0 {
            return b.value;
        }
        let t = (frame - a.frame) as f32 / span;
        a.value + (b.value - a.value) * t
    }
}

/// Grain envelope: the rising half of `window` sampled in `RAMP_STEPS` linear steps over
/// `fade_frames`, a plateau at `peak`, and the mirrored fall ending at `start + length`.
pub fn grain_envelope(
    window: &[f32],
    start: u64,
    length: u64,
    fade_frames: u64,
    peak: f32,
) -> GainAutomation {
    let fade = fade_frames.min(length / 2).max(1);
    let half = (window.len() - 1) / 2;
    let window_peak = window.get(half).copied().unwrap_or(1.0).max(1e-6);
    let rise = |step: usize| -> f32 {
        let index = step * half / RAMP_STEPS;
        peak * window.get(index).copied().unwrap_or(0.0) / window_peak
    };
    let fall = |step: usize| -> f32 {
        let index = window.len() - 1 - step * half / RAMP_STEPS;
        peak * window.get(index).copied().unwrap_or(0.0) / window_peak
    };

    let mut gain = GainAutomation {
        points: vec![Breakpoint {
            frame: start,
            value: rise(0),
        }],
        cursor: 0,
    };
    for step in 1..=RAMP_STEPS {
        gain.ramp_to(start + fade * step as u64 / RAMP_STEPS as u64, rise(step));
    }
    let fall_start = start + length - fade;
    gain.ramp_to(fall_start, peak);
    for step in (0..RAMP_STEPS).rev() {
        gain.ramp_to(
            fall_start + fade * (RAMP_STEPS - step) as u64 / RAMP_STEPS as u64,
            fall(step),
        );
    }
    gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::WindowCache;
    use crate::quality::WindowType;

    #[test]
    fn ramps_interpolate_linearly() {
        let mut gain = GainAutomation::constant(0.0);
        gain.ramp_to(100, 1.0);
        assert!((gain.value_at(50) - 0.5).abs() < 1e-6);
        assert_eq!(gain.value_at(200), 1.0);
    }

    #[test]
    fn fade_out_starts_from_current_value() {
        let mut gain = GainAutomation::constant(0.0);
        gain.ramp_to(100, 1.0);
        gain.fade_out(50, 10);
        assert!((gain.value_at(50) - 0.5).abs() < 1e-6);
        assert!((gain.value_at(55) - 0.25).abs() < 1e-6);
        assert_eq!(gain.value_at(60), 0.0);
        assert_eq!(gain.value_at(100), 0.0);
        assert_eq!(gain.end_frame(), 60);
    }

    #[test]
    fn grain_envelope_has_plateau_and_silent_edges() {
        let mut cache = WindowCache::new();
        let window = cache.get(1025, WindowType::Hann);
        let mut env = grain_envelope(&window, 1000, 4800, 960, 0.5);

        assert!(env.value_at(1000).abs() < 1e-6);
        assert!((env.value_at(1000 + 2400) - 0.5).abs() < 1e-6);
        assert!(env.value_at(1000 + 4800).abs() < 1e-6);
        assert_eq!(env.end_frame(), 1000 + 4800);

        // Rises monotonically through the fade-in
        let mut prev = 0.0;
        for f in (1000..1000 + 960).step_by(60) {
            let v = env.value_at(f);
            assert!(v >= prev - 1e-6);
            prev = v;
        }
    }
}
