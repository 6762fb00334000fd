//! Consumer notifications. Callbacks are fire-and-forget: the engine never waits on them.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::quality::QualityTier;

pub trait PlaybackObserver {
    fn on_time_update(&mut self, _current_time: f64) {}
    fn on_loop_count_update(&mut self, _count: u32) {}
    fn on_loop_complete(&mut self) {}
    fn on_quality_change(&mut self, _tier: QualityTier) {}
    fn on_playback_ended(&mut self) {}
}

/// The controller's observer slot. Native hosts move the controller onto their audio thread,
/// so observers there must be `Send`; browser callbacks stay on one thread.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxedObserver = Box<dyn PlaybackObserver + Send>;
#[cfg(target_arch = "wasm32")]
pub type BoxedObserver = Box<dyn PlaybackObserver>;

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PlaybackObserver for NullObserver {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    TimeUpdate(f64),
    LoopCountUpdate(u32),
    LoopComplete,
    QualityChange(QualityTier),
    PlaybackEnded,
}

/// Records every notification into a shared log.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn loop_counts(&self) -> Vec<u32> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::LoopCountUpdate(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: PlaybackEvent) -> usize {
        self.lock()
            .iter()
            .filter(|e| std::mem::discriminant(*e) == std::mem::discriminant(&wanted))
            .count()
    }

    fn push(&self, event: PlaybackEvent) {
        self.lock().push(event);
    }

    // A panicking writer leaves the log readable.
    fn lock(&self) -> MutexGuard<'_, Vec<PlaybackEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaybackObserver for EventLog {
    fn on_time_update(&mut self, current_time: f64) {
        self.push(PlaybackEvent::TimeUpdate(current_time));
    }

    fn on_loop_count_update(&mut self, count: u32) {
        self.push(PlaybackEvent::LoopCountUpdate(count));
    }

    fn on_loop_complete(&mut self) {
        self.push(PlaybackEvent::LoopComplete);
    }

    fn on_quality_change(&mut self, tier: QualityTier) {
        self.push(PlaybackEvent::QualityChange(tier));
    }

    fn on_playback_ended(&mut self) {
        self.push(PlaybackEvent::PlaybackEnded);
    }
}
