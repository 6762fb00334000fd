use std::sync::Arc;

use crate::buffer::SourceBuffer;
use crate::dsp::{GainAutomation, StereoLowpass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub(crate) u64);

/// Loop handling inside a voice. Positions are source frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceLoop {
    Off,
    /// Wrap forever.
    Unbounded { start: f64, end: f64 },
    /// Wrap `remaining` more times, then end at the loop end.
    Counted { start: f64, end: f64, remaining: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    /// The read position reached the loop end (wrapped or not).
    RegionEnd { voice: VoiceId, frame: u64 },
    /// The voice will produce no more output.
    Ended { voice: VoiceId, frame: u64 },
}

/// Everything needed to put a voice on the bus.
pub struct VoiceSpec {
    pub buffer: Arc<SourceBuffer>,
    /// Output frame the voice starts sounding at.
    pub start_frame: u64,
    /// Source frame read first.
    pub read_position: f64,
    /// Source frames consumed per output frame.
    pub step: f64,
    /// Output frames to play; `None` plays until the source or loop ends.
    pub length: Option<u64>,
    pub looping: VoiceLoop,
    pub gain: GainAutomation,
    pub filter: Option<StereoLowpass>,
}

/// A scheduled playback of part of the source buffer.
pub struct Voice {
    id: VoiceId,
    buffer: Arc<SourceBuffer>,
    start_frame: u64,
    stop_frame: Option<u64>,
    read_position: f64,
    step: f64,
    looping: VoiceLoop,
    gain: GainAutomation,
    filter: Option<StereoLowpass>,
    finished: bool,
}

impl Voice {
    pub(crate) fn new(id: VoiceId, spec: VoiceSpec) -> Self {
        Self {
            id,
            stop_frame: spec.length.map(|len| spec.start_frame + len),
            buffer: spec.buffer,
            start_frame: spec.start_frame,
            read_position: spec.read_position,
            step: spec.step,
            looping: spec.looping,
            gain: spec.gain,
            filter: spec.filter,
            finished: false,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fade to silence starting at `frame`, then end.
    pub(crate) fn fade_out(&mut self, frame: u64, duration: u64) {
        let frame = frame.max(self.start_frame);
        self.gain.fade_out(frame, duration);
        let end = frame + duration.max(1);
        self.stop_frame = Some(self.stop_frame.map_or(end, |stop| stop.min(end)));
    }

    fn finish(&mut self, frame: u64, events: &mut Vec<VoiceEvent>) {
        self.finished = true;
        events.push(VoiceEvent::Ended {
            voice: self.id,
            frame,
        });
    }

    /// Mix this voice into the block starting at output frame `block_start`.
    pub(crate) fn render_into(
        &mut self,
        block_start: u64,
        left: &mut [f32],
        right: &mut [f32],
        events: &mut Vec<VoiceEvent>,
    ) {
        if self.finished {
            return;
        }
        let source_end = self.buffer.frames() as f64;
        let block_len = left.len().min(right.len()) as u64;
        let first = self.start_frame.saturating_sub(block_start);

        for i in first..block_len {
            let frame = block_start + i;
            if self.stop_frame.is_some_and(|stop| frame >= stop) {
                self.finish(frame, events);
                return;
            }

            match self.looping {
                VoiceLoop::Unbounded { start, end } if self.read_position >= end => {
                    events.push(VoiceEvent::RegionEnd {
                        voice: self.id,
                        frame,
                    });
                    self.read_position = start + (self.read_position - end) % (end - start);
                }
                VoiceLoop::Counted {
                    start,
                    end,
                    remaining,
                } if self.read_position >= end => {
                    events.push(VoiceEvent::RegionEnd {
                        voice: self.id,
                        frame,
                    });
                    if remaining == 0 {
                        self.finish(frame, events);
                        return;
                    }
                    self.looping = VoiceLoop::Counted {
                        start,
                        end,
                        remaining: remaining - 1,
                    };
                    self.read_position = start + (self.read_position - end) % (end - start);
                }
                _ => {}
            }

            if self.read_position >= source_end {
                self.finish(frame, events);
                return;
            }

            let (mut l, mut r) = self.buffer.frame_at(self.read_position);
            let g = self.gain.value_at(frame);
            l *= g;
            r *= g;
            if let Some(filter) = self.filter.as_mut() {
                (l, r) = filter.process(l, r);
            }
            left[i as usize] += l;
            right[i as usize] += r;

            self.read_position += self.step;
        }
    }
}
