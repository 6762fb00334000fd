//! Standard playback path: one voice reading the buffer at a single combined rate.

use std::sync::Arc;

use crate::buffer::SourceBuffer;
use crate::dsp::GainAutomation;
use crate::params::LoopRegion;
use crate::render::{OutputBus, VoiceId, VoiceLoop, VoiceSpec};

#[derive(Debug, Clone, Copy)]
pub struct StandardStart {
    pub position: f64,
    /// Output time the voice starts at.
    pub now: f64,
    pub playback_rate: f64,
    pub loop_region: Option<LoopRegion>,
    pub max_loops: u32,
    pub loop_count: u32,
    /// Fade-in length in seconds; 0 starts at full gain.
    pub fade_in: f64,
}

#[derive(Debug, Clone)]
pub struct StandardPath {
    voice: VoiceId,
    duration: f64,
    offset_at_restart: f64,
    restart_clock: f64,
    playback_rate: f64,
    loop_region: Option<LoopRegion>,
}

impl StandardPath {
    pub fn start(buffer: &Arc<SourceBuffer>, bus: &mut OutputBus, start: StandardStart) -> Self {
        let output_rate = bus.sample_rate() as f64;
        let start_frame = (start.now.max(0.0) * output_rate).round() as u64;
        let position = start.position.clamp(0.0, buffer.duration());

        let looping = match start.loop_region {
            None => VoiceLoop::Off,
            Some(region) => {
                let (loop_start, loop_end) = (
                    buffer.seconds_to_frames(region.start()),
                    buffer.seconds_to_frames(region.end()),
                );
                if start.max_loops == 0 {
                    VoiceLoop::Unbounded {
                        start: loop_start,
                        end: loop_end,
                    }
                } else {
                    VoiceLoop::Counted {
                        start: loop_start,
                        end: loop_end,
                        remaining: start.max_loops.saturating_sub(start.loop_count + 1),
                    }
                }
            }
        };

        let fade_frames = (start.fade_in.max(0.0) * output_rate).round() as u64;
        let gain = if fade_frames == 0 {
            GainAutomation::constant(1.0)
        } else {
            let mut gain = GainAutomation::constant(0.0);
            gain.set_at(start_frame, 0.0);
            gain.ramp_to(start_frame + fade_frames, 1.0);
            gain
        };

        let voice = bus.add_voice(VoiceSpec {
            buffer: Arc::clone(buffer),
            start_frame,
            read_position: buffer.seconds_to_frames(position),
            step: start.playback_rate * buffer.sample_rate() as f64 / output_rate,
            length: None,
            looping,
            gain,
            filter: None,
        });

        Self {
            voice,
            duration: buffer.duration(),
            offset_at_restart: position,
            restart_clock: start.now,
            playback_rate: start.playback_rate,
            loop_region: start.loop_region,
        }
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    /// `offsetAtRestart + (now - restartClock) * rate`, folded into the loop and kept within the buffer.
    pub fn current_time(&self, now: f64) -> f64 {
        let t = self.offset_at_restart + (now - self.restart_clock).max(0.0) * self.playback_rate;
        let t = match self.loop_region {
            Some(region) => region.fold(t),
            None => t,
        };
        t.clamp(0.0, self.duration)
    }

    pub fn stop(&self, bus: &mut OutputBus, now: f64, fade: f64) {
        let rate = bus.sample_rate() as f64;
        let frame = (now.max(0.0) * rate).round() as u64;
        bus.fade_out(self.voice, frame, (fade.max(0.0) * rate).round() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressorConfig;
    use crate::render::VoiceEvent;
    use approx::assert_abs_diff_eq;

    fn setup() -> (Arc<SourceBuffer>, OutputBus) {
        let buffer = Arc::new(SourceBuffer::mono(vec![0.1; 1000], 100.0).unwrap());
        (buffer, OutputBus::new(100.0, 1.0, &CompressorConfig::default()))
    }

    fn start(position: f64) -> StandardStart {
        StandardStart {
            position,
            now: 0.0,
            playback_rate: 1.0,
            loop_region: None,
            max_loops: 0,
            loop_count: 0,
            fade_in: 0.0,
        }
    }

    #[test]
    fn position_tracks_rate_and_clamps() {
        let (buffer, mut bus) = setup();
        let path = StandardPath::start(
            &buffer,
            &mut bus,
            StandardStart {
                playback_rate: 0.5,
                now: 1.0,
                ..start(2.0)
            },
        );
        assert_abs_diff_eq!(path.current_time(3.0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(path.current_time(100.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn counted_loop_ends_after_remaining_wraps() {
        let (buffer, mut bus) = setup();
        let path = StandardPath::start(
            &buffer,
            &mut bus,
            StandardStart {
                loop_region: LoopRegion::new(1.0, 2.0),
                max_loops: 3,
                loop_count: 1,
                ..start(1.0)
            },
        );
        let (mut l, mut r) = (vec![0.0; 500], vec![0.0; 500]);
        let events = bus.render(0, &mut l, &mut r);
        let region_ends = events
            .iter()
            .filter(|e| matches!(e, VoiceEvent::RegionEnd { .. }))
            .count();
        assert_eq!(region_ends, 2);
        assert_eq!(
            events.last(),
            Some(&VoiceEvent::Ended {
                voice: path.voice(),
                frame: 200
            })
        );
        assert_abs_diff_eq!(path.current_time(1.5), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(path.current_time(2.5), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn fade_in_starts_silent() {
        let (buffer, mut bus) = setup();
        StandardPath::start(
            &buffer,
            &mut bus,
            StandardStart {
                fade_in: 0.04,
                ..start(0.0)
            },
        );
        let (mut l, mut r) = (vec![0.0; 8], vec![0.0; 8]);
        bus.render(0, &mut l, &mut r);
        assert_eq!(l[0], 0.0);
        assert!(l[2] > 0.0 && l[2] < l[5]);
    }
}
