//! Output clock and tick timing.
//!
//! `AudioClock` is the sample-accurate device clock: it only moves when a
//! block is rendered. `TickTimer` measures wall-clock cost of scheduler
//! ticks for the adaptive quality controller.

use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct AudioClock {
    sample_rate: f32,
    frames: u64,
}

impl AudioClock {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1.0),
            frames: 0,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Current output time in seconds.
    #[inline]
    pub fn now(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.frames += frames as u64;
    }

    #[inline]
    pub fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

/// Millisecond wall clock used to cost scheduler ticks.
pub trait TickTimer {
    fn now_ms(&self) -> f64;
}

pub type SharedTickTimer = Arc<dyn TickTimer + Send + Sync>;

/// Wall clock of the host platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimer;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
impl TickTimer for SystemTimer {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }
}

#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
impl TickTimer for SystemTimer {
    fn now_ms(&self) -> f64 {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
    }
}

pub fn system_timer() -> SharedTickTimer {
    Arc::new(SystemTimer)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_by_rendered_frames() {
        let mut clock = AudioClock::new(48_000.0);
        clock.advance(24_000);
        assert_eq!(clock.frames(), 24_000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
        assert_eq!(clock.seconds_to_frame(0.25), 12_000);
        assert_eq!(clock.seconds_to_frame(-1.0), 0);
    }

    #[test]
    fn system_timer_is_monotonic() {
        let timer = SystemTimer;
        let a = timer.now_ms();
        let b = timer.now_ms();
        assert!(b >= a);
    }
}
