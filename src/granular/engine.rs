use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::SourceBuffer;
use crate::clock::SharedTickTimer;
use crate::dsp::WindowCache;
use crate::error::Result;
use crate::params::{pitch_factor, LoopRegion};
use crate::quality::{AdaptiveThresholds, QualityMonitor, QualityTier, TierSettings};
use crate::render::{OutputBus, VoiceId};
use crate::scheduler::LookaheadScheduler;

use super::grain::Grain;
use super::phase::PhaseAccumulator;

/// Grains are released this long after their scheduled end.
pub const GRAIN_RECLAIM_MARGIN: f64 = 0.100;

/// Parameters a granular engine is started with. Changing any of them means a restart.
#[derive(Debug, Clone)]
pub struct GranularParams {
    pub playback_rate: f64,
    pub pitch_semitones: f64,
    pub loop_region: Option<LoopRegion>,
    /// 0 loops forever.
    pub max_loops: u32,
    /// Wraps already completed before this start.
    pub loop_count: u32,
    pub tier: QualityTier,
    /// `None` disables adaptive quality.
    pub adaptive: Option<AdaptiveThresholds>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    LoopCompleted { count: u32 },
    /// Adaptive quality moved one tier.
    QualityChanged(QualityTier),
    /// The engine ran out of material (loop cap or buffer end) and its last grain has ended.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EngineState {
    Idle,
    Running,
    Draining,
}

#[derive(Debug, Clone, Copy)]
struct ActiveGrain {
    voice: VoiceId,
    end_time: f64,
}

pub struct GranularEngine {
    buffer: Arc<SourceBuffer>,
    output_rate: f32,
    params: GranularParams,
    pitch_factor: f64,
    settings: TierSettings,
    scheduler: LookaheadScheduler,
    windows: WindowCache,
    phase: PhaseAccumulator,
    monitor: Option<QualityMonitor>,
    timer: SharedTickTimer,

    state: EngineState,
    loop_count: u32,
    paused_at: f64,
    start_clock: f64,
    read_position: f64,
    next_grain_time: f64,
    scheduled_until: f64,
    grains: Vec<ActiveGrain>,
    grains_scheduled: u64,
    /// Events stamped with the output time they become audible.
    pending: VecDeque<(f64, EngineEvent)>,
}

impl GranularEngine {
    pub fn new(buffer: Arc<SourceBuffer>, output_rate: f32, params: GranularParams, timer: SharedTickTimer) -> Self {
        let settings = params.tier.settings();
        Self {
            pitch_factor: pitch_factor(params.pitch_semitones),
            scheduler: LookaheadScheduler::new(&settings),
            monitor: params.adaptive.map(QualityMonitor::new),
            loop_count: params.loop_count,
            buffer,
            output_rate,
            params,
            settings,
            windows: WindowCache::new(),
            phase: PhaseAccumulator::new(),
            timer,
            state: EngineState::Idle,
            paused_at: 0.0,
            start_clock: 0.0,
            read_position: 0.0,
            next_grain_time: 0.0,
            scheduled_until: 0.0,
            grains: Vec::new(),
            grains_scheduled: 0,
            pending: VecDeque::new(),
        }
    }

    /// Start reading the source at `position` with the first grain at output time `now`.
    pub fn start(&mut self, position: f64, now: f64) {
        let position = position.clamp(0.0, self.buffer.duration());
        self.paused_at = position;
        self.start_clock = now;
        self.read_position = position;
        self.next_grain_time = now;
        self.scheduled_until = now;
        self.phase.reset();
        self.pending.clear();
        self.state = EngineState::Running;
        self.scheduler.start(now);
    }

    /// Fade every in-flight grain over `fade` seconds and cancel the pending tick.
    ///
    /// Returns the loop wraps the playhead had already crossed by `now` but that were not yet
    /// collected through `advance`.
    pub fn stop(&mut self, now: f64, bus: &mut OutputBus, fade: f64) -> Vec<EngineEvent> {
        let frame = self.to_frame(now);
        let fade_frames = self.to_frame(fade);
        for grain in self.grains.drain(..) {
            bus.fade_out(grain.voice, frame, fade_frames);
        }
        self.scheduler.cancel();
        self.state = EngineState::Idle;
        self.pending
            .drain(..)
            .filter(|(at, event)| *at <= now && matches!(event, EngineEvent::LoopCompleted { .. }))
            .map(|(_, event)| event)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.state != EngineState::Idle
    }

    pub fn tier(&self) -> QualityTier {
        self.params.tier
    }

    /// Switch tier; the next tick schedules with the new settings.
    pub fn set_tier(&mut self, tier: QualityTier) {
        if tier == self.params.tier {
            return;
        }
        debug!("granular tier {} -> {}", self.params.tier.as_str(), tier.as_str());
        self.params.tier = tier;
        self.settings = tier.settings();
        self.scheduler.retune(&self.settings);
        self.windows.invalidate();
        self.phase.reset();
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.reset();
        }
    }

    pub fn set_adaptive(&mut self, thresholds: Option<AdaptiveThresholds>) {
        self.params.adaptive = thresholds;
        self.monitor = thresholds.map(QualityMonitor::new);
    }

    /// Grains currently tracked (not yet reclaimed).
    pub fn active_grains(&self) -> usize {
        self.grains.len()
    }

    /// Grains scheduled since construction.
    pub fn grains_scheduled(&self) -> u64 {
        self.grains_scheduled
    }

    pub fn window_cache(&self) -> &WindowCache {
        &self.windows
    }

    /// Playhead position at output time `now`.
    pub fn current_time(&self, now: f64) -> f64 {
        let elapsed = (now - self.start_clock).max(0.0);
        let t = self.paused_at + elapsed * self.params.playback_rate;
        // Fold before clamping so a long-running loop never pins at the buffer end.
        let t = match self.params.loop_region {
            Some(region) => region.fold(t),
            None => t,
        };
        t.clamp(0.0, self.buffer.duration())
    }

    /// Earliest output time at which `advance` has work to do.
    pub fn next_wakeup(&self) -> Option<f64> {
        let event = self.pending.front().map(|(at, _)| *at);
        match (self.scheduler.next_tick_at(), event) {
            (Some(tick), Some(event)) => Some(tick.min(event)),
            (tick, event) => tick.or(event),
        }
    }

    /// Run a due tick and return every event that has become audible by `now`.
    pub fn advance(&mut self, now: f64, bus: &mut OutputBus) -> Vec<EngineEvent> {
        if self.scheduler.is_due(now) {
            self.tick(now, bus);
        }

        let mut due = Vec::new();
        while let Some(&(at, event)) = self.pending.front() {
            if at > now {
                break;
            }
            self.pending.pop_front();
            if event == EngineEvent::Finished {
                self.grains.clear();
                self.state = EngineState::Idle;
            }
            due.push(event);
        }
        due
    }

    /// One scheduler tick: reclaim, fill the lookahead window, then feed the quality monitor.
    pub fn tick(&mut self, now: f64, bus: &mut OutputBus) {
        let started_ms = self.timer.now_ms();
        self.reclaim(now, bus);

        if self.state == EngineState::Running {
            self.schedule(now, bus);
        }
        self.scheduler.complete_tick(now);

        let cost_ms = self.timer.now_ms() - started_ms;
        let current = self.params.tier;
        let changed = self.monitor.as_mut().and_then(|m| m.record(cost_ms, current));
        if let Some(next) = changed {
            self.set_tier(next);
            self.push_event(now, EngineEvent::QualityChanged(next));
        }
    }

    fn schedule(&mut self, now: f64, bus: &mut OutputBus) {
        // A late tick must not queue grains in the past; the read pointer skips with the clock.
        if self.next_grain_time < now {
            self.read_position += (now - self.next_grain_time) * self.params.playback_rate;
            self.next_grain_time = now;
        }
        if !self.follow_boundary() {
            return;
        }
        let horizon = self.scheduler.horizon(now);
        let spacing = self.settings.grain_spacing(self.params.playback_rate);
        let advance = spacing * self.params.playback_rate;
        let mut scheduled = 0;

        while self.next_grain_time < horizon && scheduled < self.settings.max_grains_per_tick {
            let result = self.schedule_grain(bus, spacing);
            self.next_grain_time += spacing;
            self.read_position += advance;
            if !self.follow_boundary() {
                return;
            }
            if let Err(err) = result {
                warn!("grain skipped: {}", err);
                break;
            }
            scheduled += 1;
        }
    }

    /// Wrap the read pointer at the loop end or drain at the buffer end. Returns false once
    /// draining.
    ///
    /// A wrap is stamped at the output time the playhead crosses the loop end, which can be
    /// earlier than the next grain onset.
    fn follow_boundary(&mut self) -> bool {
        match self.params.loop_region {
            Some(region) if self.read_position >= region.end() => {
                self.loop_count += 1;
                let count = self.loop_count;
                let overshoot = (self.read_position - region.end()) / self.params.playback_rate;
                let crossing = (self.next_grain_time - overshoot).max(self.start_clock);
                self.push_event(crossing, EngineEvent::LoopCompleted { count });
                if self.params.max_loops > 0 && self.loop_count >= self.params.max_loops {
                    self.drain();
                    return false;
                }
                self.read_position =
                    region.start() + (self.read_position - region.start()).rem_euclid(region.length());
                true
            }
            None if self.read_position >= self.buffer.duration() => {
                self.drain();
                false
            }
            _ => true,
        }
    }

    fn schedule_grain(&mut self, bus: &mut OutputBus, spacing: f64) -> Result<()> {
        let correction = if self.settings.phase_coherence {
            self.phase.advance(
                spacing,
                self.params.playback_rate,
                self.pitch_factor,
                self.settings.grain_duration,
            )
        } else {
            0.0
        };

        // The correction may not pull a grain in front of the buffer start.
        let offset = (self.read_position + correction).max(0.0);
        let grain = Grain::fit(
            self.next_grain_time,
            offset,
            self.pitch_factor,
            &self.settings,
            self.buffer.duration(),
            self.output_rate,
        )?;
        let spec = grain.to_voice(&self.buffer, self.output_rate, &self.settings, &mut self.windows);
        let voice = bus.add_voice(spec);
        self.grains.push(ActiveGrain {
            voice,
            end_time: grain.end_time(),
        });
        self.grains_scheduled += 1;
        self.scheduled_until = self.scheduled_until.max(grain.end_time());
        Ok(())
    }

    fn reclaim(&mut self, now: f64, bus: &mut OutputBus) {
        self.grains.retain(|grain| {
            if grain.end_time + GRAIN_RECLAIM_MARGIN < now {
                bus.release(grain.voice);
                false
            } else {
                true
            }
        });
    }

    /// No more grains; finish once the last scheduled one has sounded.
    fn drain(&mut self) {
        let until = self.scheduled_until.max(self.next_grain_time);
        debug!("granular engine draining until {:.3}s", until);
        self.state = EngineState::Draining;
        self.scheduler.cancel();
        self.push_event(until, EngineEvent::Finished);
    }

    fn push_event(&mut self, at: f64, event: EngineEvent) {
        let index = self.pending.partition_point(|(t, _)| *t <= at);
        self.pending.insert(index, (at, event));
    }

    fn to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.output_rate as f64).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::stepping_timer as timer;
    use crate::config::CompressorConfig;
    use approx::assert_abs_diff_eq;

    const RATE: f32 = 1_000.0;

    fn buffer(seconds: usize) -> Arc<SourceBuffer> {
        Arc::new(SourceBuffer::mono(vec![0.1; seconds * RATE as usize], RATE).unwrap())
    }

    fn bus() -> OutputBus {
        OutputBus::new(RATE, 1.0, &CompressorConfig::default())
    }

    fn params(tier: QualityTier) -> GranularParams {
        GranularParams {
            playback_rate: 1.0,
            pitch_semitones: 3.0,
            loop_region: None,
            max_loops: 0,
            loop_count: 0,
            tier,
            adaptive: None,
        }
    }

    /// Step wakeups until `end`, collecting events with their times.
    fn run(engine: &mut GranularEngine, bus: &mut OutputBus, end: f64) -> Vec<(f64, EngineEvent)> {
        let mut events = Vec::new();
        while let Some(at) = engine.next_wakeup() {
            if at > end {
                break;
            }
            for event in engine.advance(at, bus) {
                events.push((at, event));
            }
        }
        events
    }

    #[test]
    fn first_tick_fills_the_lookahead_window() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(buffer(10), RATE, params(QualityTier::Medium), timer(0.0));
        engine.start(1.0, 0.0);
        engine.advance(0.0, &mut bus);
        // 150 ms lookahead at 32 ms spacing.
        assert_eq!(engine.grains_scheduled(), 5);
        assert_eq!(bus.voice_count(), 5);
        assert_eq!(engine.next_wakeup(), Some(0.030));
    }

    #[test]
    fn grains_are_reclaimed_after_their_margin() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(buffer(10), RATE, params(QualityTier::Low), timer(0.0));
        engine.start(0.0, 0.0);
        run(&mut engine, &mut bus, 2.0);
        // Only grains ending within the margin of the last tick survive.
        assert!(engine.active_grains() <= 8);
        assert!(engine.grains_scheduled() > 30);
    }

    #[test]
    fn tempo_and_position_are_independent_of_pitch() {
        let mut engine = GranularEngine::new(
            buffer(10),
            RATE,
            GranularParams {
                playback_rate: 1.5,
                pitch_semitones: -7.0,
                ..params(QualityTier::High)
            },
            timer(0.0),
        );
        engine.start(2.0, 10.0);
        assert_abs_diff_eq!(engine.current_time(12.0), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(engine.current_time(100.0), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn counted_loop_reports_each_wrap_then_finishes() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(
            buffer(10),
            RATE,
            GranularParams {
                loop_region: LoopRegion::new(2.0, 5.0),
                max_loops: 3,
                ..params(QualityTier::Medium)
            },
            timer(0.0),
        );
        engine.start(2.0, 0.0);
        let events = run(&mut engine, &mut bus, 20.0);

        let counts: Vec<u32> = events
            .iter()
            .filter_map(|(_, e)| match e {
                EngineEvent::LoopCompleted { count } => Some(*count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
        let wrap_times: Vec<f64> = events
            .iter()
            .filter(|(_, e)| matches!(e, EngineEvent::LoopCompleted { .. }))
            .map(|(at, _)| *at)
            .collect();
        for (at, expected) in wrap_times.iter().zip([3.0, 6.0, 9.0]) {
            assert_abs_diff_eq!(*at, expected, epsilon = 1e-6);
        }

        let (finished_at, last) = events[events.len() - 1];
        assert_eq!(last, EngineEvent::Finished);
        assert!((9.0..9.2).contains(&finished_at), "finished at {finished_at}");
        assert!(!engine.is_running());
        assert_eq!(engine.next_wakeup(), None);
    }

    #[test]
    fn unbounded_loop_keeps_wrapping() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(
            buffer(4),
            RATE,
            GranularParams {
                loop_region: LoopRegion::new(1.0, 2.0),
                ..params(QualityTier::Low)
            },
            timer(0.0),
        );
        engine.start(1.0, 0.0);
        let events = run(&mut engine, &mut bus, 10.5);
        let wraps = events
            .iter()
            .filter(|(_, e)| matches!(e, EngineEvent::LoopCompleted { .. }))
            .count();
        assert_eq!(wraps, 10);
        assert!(engine.is_running());
        assert!(engine.current_time(10.5) >= 1.0 && engine.current_time(10.5) < 2.0);
    }

    #[test]
    fn buffer_end_without_loop_finishes() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(buffer(2), RATE, params(QualityTier::Low), timer(0.0));
        engine.start(1.5, 0.0);
        let events = run(&mut engine, &mut bus, 5.0);
        assert_eq!(events.last().map(|(_, e)| *e), Some(EngineEvent::Finished));
        assert_abs_diff_eq!(engine.current_time(5.0), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn stop_fades_grains_and_cancels_the_tick() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(buffer(10), RATE, params(QualityTier::High), timer(0.0));
        engine.start(0.0, 0.0);
        engine.advance(0.0, &mut bus);
        assert!(bus.voice_count() > 1);

        engine.stop(0.0, &mut bus, 0.03);
        // Nothing has sounded by frame 0, so every grain is dropped outright.
        assert_eq!(bus.voice_count(), 0);
        assert_eq!(engine.next_wakeup(), None);
        assert_eq!(engine.active_grains(), 0);
    }

    fn short_loop(start: f64) -> GranularEngine {
        let mut engine = GranularEngine::new(
            buffer(2),
            RATE,
            GranularParams {
                loop_region: LoopRegion::new(1.0, 1.1),
                ..params(QualityTier::Medium)
            },
            timer(0.0),
        );
        engine.start(start, 0.0);
        engine
    }

    #[test]
    fn wrap_is_stamped_when_the_playhead_crosses_the_loop_end() {
        let mut bus = bus();
        let mut engine = short_loop(1.0);
        engine.advance(0.0, &mut bus);
        let events = run(&mut engine, &mut bus, 0.15);
        assert_eq!(events.len(), 1);
        let (at, event) = events[0];
        assert_eq!(event, EngineEvent::LoopCompleted { count: 1 });
        // The next grain onset after the crossing is 0.128.
        assert_abs_diff_eq!(at, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn stop_reports_wraps_that_already_sounded() {
        let mut bus = bus();
        let mut engine = short_loop(1.0);
        engine.advance(0.0, &mut bus);
        assert_eq!(
            engine.stop(0.12, &mut bus, 0.01),
            vec![EngineEvent::LoopCompleted { count: 1 }]
        );
        assert_eq!(engine.next_wakeup(), None);

        let mut early = short_loop(1.0);
        early.advance(0.0, &mut bus);
        assert!(early.stop(0.05, &mut bus, 0.01).is_empty());
    }

    #[test]
    fn late_tick_keeps_the_read_pointer_on_the_clock() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(buffer(10), RATE, params(QualityTier::Medium), timer(0.0));
        engine.start(1.0, 0.0);
        engine.advance(0.0, &mut bus);
        // Skip well past the lookahead; the catch-up must not replay the gap.
        engine.advance(1.0, &mut bus);
        assert_abs_diff_eq!(engine.read_position, 2.0 + 0.032 * 5.0, epsilon = 1e-9);
    }

    #[test]
    fn grain_without_source_left_is_skipped_and_scheduling_continues() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(
            buffer(1),
            RATE,
            GranularParams {
                loop_region: LoopRegion::new(0.5, 1.0),
                ..params(QualityTier::Medium)
            },
            timer(0.0),
        );
        // Less than one crossfade of output is left before the buffer end.
        engine.start(0.99, 0.0);
        engine.advance(0.0, &mut bus);
        assert_eq!(engine.grains_scheduled(), 0);
        assert_eq!(bus.voice_count(), 0);
        assert!(engine.is_running());
        // The wrap lands 10 ms in, ahead of the next tick.
        assert_abs_diff_eq!(engine.next_wakeup().unwrap(), 0.010, epsilon = 1e-9);

        let events = run(&mut engine, &mut bus, 0.5);
        assert!(engine.grains_scheduled() > 0);
        let (at, first) = events[0];
        assert_eq!(first, EngineEvent::LoopCompleted { count: 1 });
        assert_abs_diff_eq!(at, 0.010, epsilon = 1e-9);
    }

    #[test]
    fn expensive_ticks_downgrade_one_tier_per_window() {
        let mut bus = bus();
        let mut engine = GranularEngine::new(
            buffer(60),
            RATE,
            GranularParams {
                adaptive: Some(AdaptiveThresholds::default()),
                ..params(QualityTier::High)
            },
            timer(6.0),
        );
        engine.start(0.0, 0.0);
        engine.advance(0.0, &mut bus);
        assert!(!engine.window_cache().is_empty());

        let mut changes = Vec::new();
        for _ in 0..99 {
            let at = engine.next_wakeup().unwrap();
            for event in engine.advance(at, &mut bus) {
                changes.push(event);
            }
        }
        assert_eq!(changes, vec![EngineEvent::QualityChanged(QualityTier::Medium)]);
        assert_eq!(engine.tier(), QualityTier::Medium);
        assert!(engine.window_cache().is_empty());
    }
}
