//! Playback Controller: session state, path selection and the transport API.
//!
//! The controller owns the output clock and bus. Hosts drive it by calling
//! [`PlaybackController::process`] once per audio block; every scheduler tick
//! and event delivery happens inside that call at its due frame.

mod path;

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::buffer::SourceBuffer;
use crate::clock::{system_timer, AudioClock, SharedTickTimer};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::granular::{EngineEvent, GranularEngine, GranularParams};
use crate::observer::{BoxedObserver, NullObserver};
use crate::params::{clamp_pitch_shift, clamp_playback_rate, LoopPointKind, LoopRegion};
use crate::quality::{AdaptiveThresholds, QualityTier};
use crate::render::{OutputBus, VoiceEvent};
use crate::standard::{StandardPath, StandardStart};

use path::PlaybackPath;
pub use path::{select_path, PathKind};

/// Output gain changes ramp over this long.
pub const VOLUME_RAMP: f64 = 0.010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stopped,
    Playing,
    /// Stopped with the position kept for resume.
    Paused,
}

/// Read-only snapshot of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub duration: Option<f64>,
    pub playback_rate: f64,
    pub pitch_shift: f64,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
    pub max_loops: u32,
    pub loop_count: u32,
    pub position: f64,
    pub transport: Transport,
    pub is_playing: bool,
    pub quality_mode: QualityTier,
    pub adaptive_quality: bool,
    pub preserve_pitch: bool,
    pub volume: f32,
    pub active_path: Option<PathKind>,
}

pub struct PlaybackController {
    config: EngineConfig,
    clock: AudioClock,
    bus: OutputBus,
    timer: SharedTickTimer,
    observer: BoxedObserver,

    buffer: Option<Arc<SourceBuffer>>,
    playback_rate: f64,
    pitch_shift: f64,
    loop_start: Option<f64>,
    loop_end: Option<f64>,
    max_loops: u32,
    loop_count: u32,
    position: f64,
    transport: Transport,
    quality_mode: QualityTier,
    adaptive_quality: bool,
    preserve_pitch: bool,
    volume: f32,

    path: Option<PlaybackPath>,
    swap_in_progress: bool,
}

impl PlaybackController {
    pub fn new(sample_rate: f32, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let clock = AudioClock::new(sample_rate);
        Ok(Self {
            bus: OutputBus::new(clock.sample_rate(), config.output_gain, &config.compressor),
            clock,
            timer: system_timer(),
            observer: Box::new(NullObserver),
            buffer: None,
            playback_rate: 1.0,
            pitch_shift: 0.0,
            loop_start: None,
            loop_end: None,
            max_loops: 0,
            loop_count: 0,
            position: 0.0,
            transport: Transport::Stopped,
            quality_mode: config.quality_mode,
            adaptive_quality: config.adaptive_quality,
            preserve_pitch: config.preserve_pitch,
            volume: config.output_gain,
            path: None,
            swap_in_progress: false,
            config,
        })
    }

    /// Replace the wall clock used to cost scheduler ticks.
    pub fn with_timer(mut self, timer: SharedTickTimer) -> Self {
        self.timer = timer;
        self
    }

    pub fn set_observer(&mut self, observer: BoxedObserver) {
        self.observer = observer;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.clock.sample_rate()
    }

    /// Output clock time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn active_path(&self) -> Option<PathKind> {
        self.path.as_ref().map(PlaybackPath::kind)
    }

    /// Voices currently queued on the output bus.
    pub fn active_voices(&self) -> usize {
        self.bus.voice_count()
    }

    pub fn buffer(&self) -> Option<&Arc<SourceBuffer>> {
        self.buffer.as_ref()
    }

    pub fn load(&mut self, buffer: SourceBuffer) {
        self.load_shared(Arc::new(buffer));
    }

    /// Start a new session on `buffer`. Rate, pitch and quality settings carry over.
    pub fn load_shared(&mut self, buffer: Arc<SourceBuffer>) {
        self.teardown();
        info!(
            "loaded {:.2}s of audio ({} ch @ {} Hz)",
            buffer.duration(),
            buffer.channels(),
            buffer.sample_rate()
        );
        self.buffer = Some(buffer);
        self.reset_session();
    }

    pub fn unload(&mut self) {
        if self.buffer.take().is_none() {
            return;
        }
        self.teardown();
        self.bus.clear();
        self.reset_session();
        info!("buffer unloaded");
    }

    pub fn play(&mut self) {
        if self.transport == Transport::Playing {
            return;
        }
        let Some(buffer) = self.buffer.clone() else {
            return;
        };
        if self.loop_cap_reached() {
            self.loop_count = 0;
        }
        self.transport = Transport::Playing;
        self.start_path(buffer, self.position, 0.0);
    }

    /// Keep the position and loop count; `play` resumes from here.
    pub fn pause(&mut self) {
        if self.transport != Transport::Playing {
            return;
        }
        self.position = self.get_current_time();
        self.teardown();
        self.transport = Transport::Paused;
    }

    pub fn stop(&mut self) {
        if self.transport == Transport::Stopped {
            return;
        }
        self.teardown();
        self.position = 0.0;
        self.loop_count = 0;
        self.transport = Transport::Stopped;
        self.observer.on_time_update(0.0);
        self.observer.on_loop_count_update(0);
    }

    pub fn seek(&mut self, seconds: f64) {
        let Some(duration) = self.duration() else {
            return;
        };
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        if self.transport == Transport::Playing {
            self.restart_at(target);
        } else {
            self.position = target;
        }
        let time = self.get_current_time();
        self.observer.on_time_update(time);
    }

    /// Returns the rate actually applied.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        let rate = clamp_playback_rate(rate);
        if rate != self.playback_rate {
            self.hot_swap(|c| c.playback_rate = rate);
        }
        rate
    }

    /// Returns the shift actually applied, in semitones.
    pub fn set_pitch_shift(&mut self, semitones: f64) -> f64 {
        let semitones = clamp_pitch_shift(semitones);
        if semitones != self.pitch_shift {
            self.hot_swap(|c| c.pitch_shift = semitones);
        }
        semitones
    }

    pub fn set_preserve_pitch(&mut self, preserve: bool) {
        if preserve != self.preserve_pitch {
            self.hot_swap(|c| c.preserve_pitch = preserve);
        }
    }

    /// Capture the current position as a loop bound.
    ///
    /// A start at or after the stored end is rejected, as is an end with no start or an
    /// end at or before the start. Rejection returns `None` and changes nothing.
    pub fn set_loop_point(&mut self, kind: LoopPointKind) -> Option<f64> {
        self.buffer.as_ref()?;
        let t = self.get_current_time();
        let before = self.loop_region();

        match kind {
            LoopPointKind::Start => {
                if self.loop_end.is_some_and(|end| t >= end) {
                    warn!("loop start {:.3}s rejected: not before loop end", t);
                    return None;
                }
                self.loop_start = Some(t);
            }
            LoopPointKind::End => match self.loop_start {
                Some(start) if t > start => self.loop_end = Some(t),
                Some(_) => {
                    warn!("loop end {:.3}s rejected: not after loop start", t);
                    return None;
                }
                None => {
                    warn!("loop end {:.3}s rejected: no loop start set", t);
                    return None;
                }
            },
        }

        self.loop_region_changed(before);
        Some(t)
    }

    /// Set both bounds at once. Both must lie within the buffer with `end > start`.
    pub fn set_loop(&mut self, start: f64, end: f64) -> Option<LoopRegion> {
        let duration = self.duration()?;
        let region = LoopRegion::new(start, end).filter(|r| r.end() <= duration);
        let Some(region) = region else {
            warn!("loop [{:.3}, {:.3}] rejected", start, end);
            return None;
        };
        let before = self.loop_region();
        self.loop_start = Some(region.start());
        self.loop_end = Some(region.end());
        self.loop_region_changed(before);
        Some(region)
    }

    pub fn clear_loop(&mut self) {
        let before = self.loop_region();
        self.loop_start = None;
        self.loop_end = None;
        if self.loop_count != 0 {
            self.loop_count = 0;
            self.observer.on_loop_count_update(0);
        }
        self.loop_region_changed(before);
    }

    /// 0 loops forever.
    pub fn set_max_loops(&mut self, max_loops: u32) {
        if max_loops != self.max_loops {
            self.hot_swap(|c| c.max_loops = max_loops);
        }
    }

    /// Applied to a running granular engine from its next tick, without a restart.
    pub fn set_quality_mode(&mut self, tier: QualityTier) {
        if tier == self.quality_mode {
            return;
        }
        debug!("quality mode {} -> {}", self.quality_mode.as_str(), tier.as_str());
        self.quality_mode = tier;
        if let Some(PlaybackPath::Granular(engine)) = self.path.as_mut() {
            engine.set_tier(tier);
        }
        self.observer.on_quality_change(tier);
    }

    pub fn set_adaptive_quality(&mut self, enabled: bool) {
        self.adaptive_quality = enabled;
        let thresholds = self.adaptive_thresholds();
        if let Some(PlaybackPath::Granular(engine)) = self.path.as_mut() {
            engine.set_adaptive(thresholds);
        }
    }

    pub fn set_volume(&mut self, gain: f32) {
        let gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 };
        self.volume = gain;
        let ramp = self.clock.seconds_to_frame(VOLUME_RAMP);
        self.bus.set_output_gain(self.clock.frames(), gain, ramp);
    }

    pub fn get_current_time(&self) -> f64 {
        match (&self.path, self.transport) {
            (Some(path), Transport::Playing) => path.current_time(self.clock.now()),
            _ => self.position,
        }
    }

    /// Called by the host at display cadence.
    pub fn animation_frame(&mut self) {
        if self.transport == Transport::Playing {
            let time = self.get_current_time();
            self.observer.on_time_update(time);
        }
    }

    /// Render one block and advance the output clock. Scheduler ticks run at their due frame.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let sample_rate = self.clock.sample_rate() as f64;
        let mut offset = 0;

        while offset < frames {
            self.service_engine();

            let mut chunk = frames - offset;
            let block_start = self.clock.frames();
            if let Some(at) = self.next_wakeup() {
                let wake = (at * sample_rate).ceil().max(0.0) as u64;
                if wake > block_start {
                    chunk = chunk.min((wake - block_start) as usize);
                }
            }

            let events = self.bus.render(
                block_start,
                &mut left[offset..offset + chunk],
                &mut right[offset..offset + chunk],
            );
            self.clock.advance(chunk);
            self.handle_voice_events(&events);
            offset += chunk;
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            duration: self.duration(),
            playback_rate: self.playback_rate,
            pitch_shift: self.pitch_shift,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
            max_loops: self.max_loops,
            loop_count: self.loop_count,
            position: self.get_current_time(),
            transport: self.transport,
            is_playing: self.is_playing(),
            quality_mode: self.quality_mode,
            adaptive_quality: self.adaptive_quality,
            preserve_pitch: self.preserve_pitch,
            volume: self.volume,
            active_path: self.active_path(),
        }
    }

    fn duration(&self) -> Option<f64> {
        self.buffer.as_ref().map(|b| b.duration())
    }

    fn loop_region(&self) -> Option<LoopRegion> {
        match (self.loop_start, self.loop_end) {
            (Some(start), Some(end)) => LoopRegion::new(start, end),
            _ => None,
        }
    }

    fn adaptive_thresholds(&self) -> Option<AdaptiveThresholds> {
        self.adaptive_quality.then_some(self.config.adaptive)
    }

    fn stop_fade(&self) -> f64 {
        self.config.stop_fade_ms as f64 / 1000.0
    }

    fn reset_session(&mut self) {
        self.loop_start = None;
        self.loop_end = None;
        self.loop_count = 0;
        self.position = 0.0;
        self.transport = Transport::Stopped;
    }

    fn start_path(&mut self, buffer: Arc<SourceBuffer>, position: f64, fade_in: f64) {
        let region = self.loop_region();
        let position = region
            .map_or(position, |r| r.entry_point(position))
            .clamp(0.0, buffer.duration());
        let now = self.clock.now();
        let kind = select_path(self.playback_rate, self.pitch_shift, self.preserve_pitch);
        debug!(
            "starting {} path at {:.3}s (rate {}, pitch {})",
            kind, position, self.playback_rate, self.pitch_shift
        );

        let path = match kind {
            PathKind::Standard => PlaybackPath::Standard(StandardPath::start(
                &buffer,
                &mut self.bus,
                StandardStart {
                    position,
                    now,
                    playback_rate: self.playback_rate,
                    loop_region: region,
                    max_loops: self.max_loops,
                    loop_count: self.loop_count,
                    fade_in,
                },
            )),
            PathKind::Granular => {
                let params = GranularParams {
                    playback_rate: self.playback_rate,
                    pitch_semitones: self.pitch_shift,
                    loop_region: region,
                    max_loops: self.max_loops,
                    loop_count: self.loop_count,
                    tier: self.quality_mode,
                    adaptive: self.adaptive_thresholds(),
                };
                let mut engine = GranularEngine::new(buffer, self.clock.sample_rate(), params, self.timer.clone());
                engine.start(position, now);
                PlaybackPath::Granular(Box::new(engine))
            }
        };
        self.path = Some(path);
    }

    /// Fade out and drop the live path, if any. Wraps that already sounded are still counted.
    fn teardown(&mut self) {
        let fade = self.stop_fade();
        let Some(mut path) = self.path.take() else {
            return;
        };
        for event in path.teardown(&mut self.bus, self.clock.now(), fade) {
            if let EngineEvent::LoopCompleted { count } = event {
                self.loop_completed(count);
            }
        }
    }

    /// Tear down and restart at `position` with the current parameters.
    fn restart_at(&mut self, position: f64) {
        let Some(buffer) = self.buffer.clone() else {
            return;
        };
        self.swap_in_progress = true;
        self.teardown();
        self.swap_in_progress = false;
        // The last permitted wrap sounded just before the swap.
        if self.loop_cap_reached() {
            self.finish();
            return;
        }
        let fade = self.stop_fade();
        self.start_path(buffer, position, fade);
    }

    /// Apply a parameter change, restarting at the captured position if playing.
    fn hot_swap(&mut self, apply: impl FnOnce(&mut Self)) {
        if self.transport != Transport::Playing || self.swap_in_progress {
            apply(self);
            return;
        }
        let position = self.get_current_time();
        apply(self);
        debug!("hot-swap at {:.3}s", position);
        self.restart_at(position);
    }

    fn loop_region_changed(&mut self, before: Option<LoopRegion>) {
        if self.loop_region() != before && self.transport == Transport::Playing {
            let position = self.get_current_time();
            self.restart_at(position);
        }
    }

    fn next_wakeup(&self) -> Option<f64> {
        match &self.path {
            Some(PlaybackPath::Granular(engine)) => engine.next_wakeup(),
            _ => None,
        }
    }

    fn service_engine(&mut self) {
        // Half a frame of slack so a wakeup rounded onto this frame is due.
        let now = self.clock.now() + 0.5 / self.clock.sample_rate() as f64;
        let events = match self.path.as_mut() {
            Some(PlaybackPath::Granular(engine)) => engine.advance(now, &mut self.bus),
            _ => return,
        };
        for event in events {
            self.handle_engine_event(event);
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LoopCompleted { count } => self.loop_completed(count),
            EngineEvent::QualityChanged(tier) => {
                debug!("adaptive quality moved to {}", tier.as_str());
                self.quality_mode = tier;
                self.observer.on_quality_change(tier);
            }
            EngineEvent::Finished => self.finish(),
        }
    }

    fn handle_voice_events(&mut self, events: &[VoiceEvent]) {
        let Some(PlaybackPath::Standard(path)) = self.path.as_ref() else {
            return;
        };
        let active = path.voice();
        for event in events {
            match *event {
                VoiceEvent::RegionEnd { voice, .. } if voice == active => {
                    self.loop_completed(self.loop_count + 1);
                }
                VoiceEvent::Ended { voice, .. } if voice == active => {
                    self.finish();
                    return;
                }
                _ => {}
            }
        }
    }

    fn loop_cap_reached(&self) -> bool {
        self.max_loops > 0 && self.loop_count >= self.max_loops
    }

    fn loop_completed(&mut self, count: u32) {
        self.loop_count = count;
        self.observer.on_loop_count_update(count);
        self.observer.on_loop_complete();
    }

    /// The live path ran out: loop cap reached or buffer end.
    fn finish(&mut self) {
        if self.swap_in_progress {
            return;
        }
        let capped = self.loop_cap_reached();
        self.path = None;
        self.position = match self.loop_region() {
            Some(region) if capped => region.start(),
            _ => 0.0,
        };
        info!(
            "playback finished after {} loop(s); resting at {:.3}s",
            self.loop_count, self.position
        );
        self.loop_count = 0;
        self.transport = Transport::Stopped;
        self.observer.on_playback_ended();
    }
}
