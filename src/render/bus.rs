use crate::config::CompressorConfig;
use crate::dsp::{DynamicsCompressor, GainAutomation};

use super::voice::{Voice, VoiceEvent, VoiceId, VoiceSpec};

/// Sample-accurate output queue: voices → shared output gain → compressor.
pub struct OutputBus {
    sample_rate: f32,
    voices: Vec<Voice>,
    next_id: u64,
    output_gain: GainAutomation,
    compressor: DynamicsCompressor,
    mix_left: Vec<f32>,
    mix_right: Vec<f32>,
}

impl OutputBus {
    pub fn new(sample_rate: f32, output_gain: f32, compressor: &CompressorConfig) -> Self {
        Self {
            sample_rate,
            voices: Vec::new(),
            next_id: 1,
            output_gain: GainAutomation::constant(output_gain),
            compressor: DynamicsCompressor::new(sample_rate, compressor),
            mix_left: vec![0.0; 128],
            mix_right: vec![0.0; 128],
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn add_voice(&mut self, spec: VoiceSpec) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.voices.push(Voice::new(id, spec));
        id
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Detach a voice immediately.
    pub fn release(&mut self, id: VoiceId) {
        self.voices.retain(|v| v.id() != id);
    }

    /// Fade a voice out from `frame`. Voices that have not started yet are dropped.
    pub fn fade_out(&mut self, id: VoiceId, frame: u64, fade_frames: u64) {
        self.voices.retain_mut(|v| {
            if v.id() != id {
                return true;
            }
            if v.start_frame() >= frame {
                return false;
            }
            v.fade_out(frame, fade_frames);
            true
        });
    }

    /// Ramp the shared output gain to `value` over `ramp_frames`.
    pub fn set_output_gain(&mut self, frame: u64, value: f32, ramp_frames: u64) {
        self.output_gain.cancel_after(frame);
        self.output_gain.ramp_to(frame + ramp_frames, value.clamp(0.0, 1.0));
    }

    /// Render one block starting at output frame `block_start`, overwriting `left`/`right`.
    pub fn render(&mut self, block_start: u64, left: &mut [f32], right: &mut [f32]) -> Vec<VoiceEvent> {
        let n = left.len().min(right.len());
        if self.mix_left.len() < n {
            self.mix_left.resize(n, 0.0);
            self.mix_right.resize(n, 0.0);
        }
        let mix_left = &mut self.mix_left[..n];
        let mix_right = &mut self.mix_right[..n];
        mix_left.fill(0.0);
        mix_right.fill(0.0);

        let mut events = Vec::new();
        for voice in self.voices.iter_mut() {
            voice.render_into(block_start, mix_left, mix_right, &mut events);
        }
        self.voices.retain(|v| !v.is_finished());

        for i in 0..n {
            let g = self.output_gain.value_at(block_start + i as u64);
            mix_left[i] *= g;
            mix_right[i] *= g;
        }
        self.compressor.process(mix_left, mix_right);

        left[..n].copy_from_slice(mix_left);
        right[..n].copy_from_slice(mix_right);
        events
    }

    /// Drop every voice and reset the compressor.
    pub fn clear(&mut self) {
        self.voices.clear();
        self.compressor.reset();
    }
}
