//! The audio-thread side: applies queued transport commands, then renders.

use crossbeam_channel::{Receiver, Sender};

use practice_player::{LoopPointKind, PlaybackController, PlaybackObserver, QualityTier};

pub trait BlockRenderer: Send + 'static {
    fn render_block(&mut self, left: &mut [f32], right: &mut [f32]);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Seek(f64),
    Rate(f64),
    Pitch(f64),
    LoopPoint(LoopPointKind),
    Loop(f64, f64),
    ClearLoop,
    MaxLoops(u32),
    Quality(QualityTier),
    Adaptive(bool),
    PreservePitch(bool),
    Volume(f32),
    Status,
}

/// What the audio thread reports back to the console.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Time(f64),
    LoopCount(u32),
    LoopComplete,
    Quality(QualityTier),
    Ended,
    LoopPoint(LoopPointKind, Option<f64>),
    Applied(String),
}

pub struct ChannelObserver {
    notices: Sender<Notice>,
}

impl ChannelObserver {
    pub fn new(notices: Sender<Notice>) -> Self {
        Self { notices }
    }

    fn send(&self, notice: Notice) {
        // The console may already be gone during shutdown.
        let _ = self.notices.try_send(notice);
    }
}

impl PlaybackObserver for ChannelObserver {
    fn on_time_update(&mut self, current_time: f64) {
        self.send(Notice::Time(current_time));
    }

    fn on_loop_count_update(&mut self, count: u32) {
        self.send(Notice::LoopCount(count));
    }

    fn on_loop_complete(&mut self) {
        self.send(Notice::LoopComplete);
    }

    fn on_quality_change(&mut self, tier: QualityTier) {
        self.send(Notice::Quality(tier));
    }

    fn on_playback_ended(&mut self) {
        self.send(Notice::Ended);
    }
}

pub struct PlayerRenderer {
    controller: PlaybackController,
    commands: Receiver<Command>,
    notices: Sender<Notice>,
}

impl PlayerRenderer {
    pub fn new(controller: PlaybackController, commands: Receiver<Command>, notices: Sender<Notice>) -> Self {
        Self {
            controller,
            commands,
            notices,
        }
    }

    fn apply(&mut self, command: Command) {
        let c = &mut self.controller;
        let applied = match command {
            Command::Play => {
                c.play();
                None
            }
            Command::Pause => {
                c.pause();
                None
            }
            Command::Stop => {
                c.stop();
                None
            }
            Command::Seek(t) => {
                c.seek(t);
                None
            }
            Command::Rate(rate) => Some(format!("rate {}", c.set_playback_rate(rate))),
            Command::Pitch(semitones) => Some(format!("pitch {:+}", c.set_pitch_shift(semitones))),
            Command::LoopPoint(kind) => {
                let accepted = c.set_loop_point(kind);
                let _ = self.notices.try_send(Notice::LoopPoint(kind, accepted));
                None
            }
            Command::Loop(start, end) => Some(match c.set_loop(start, end) {
                Some(region) => format!("loop [{:.3}, {:.3}]", region.start(), region.end()),
                None => "loop rejected".to_string(),
            }),
            Command::ClearLoop => {
                c.clear_loop();
                Some("loop cleared".to_string())
            }
            Command::MaxLoops(n) => {
                c.set_max_loops(n);
                Some(format!("max loops {}", n))
            }
            Command::Quality(tier) => {
                c.set_quality_mode(tier);
                None
            }
            Command::Adaptive(on) => {
                c.set_adaptive_quality(on);
                Some(format!("adaptive quality {}", if on { "on" } else { "off" }))
            }
            Command::PreservePitch(on) => {
                c.set_preserve_pitch(on);
                Some(format!("preserve pitch {}", if on { "on" } else { "off" }))
            }
            Command::Volume(gain) => {
                c.set_volume(gain);
                Some(format!("volume {:.2}", gain.clamp(0.0, 1.0)))
            }
            Command::Status => {
                let state = c.state();
                Some(match serde_json::to_string(&state) {
                    Ok(json) => json,
                    Err(err) => format!("state unavailable: {}", err),
                })
            }
        };
        if let Some(message) = applied {
            let _ = self.notices.try_send(Notice::Applied(message));
        }
    }
}

impl BlockRenderer for PlayerRenderer {
    fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
        self.controller.process(left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use practice_player::EngineConfig;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn renderer_moves_to_the_audio_thread() {
        let (notice_tx, _notice_rx) = unbounded();
        let (_command_tx, command_rx) = unbounded();
        let mut controller = PlaybackController::new(8_000.0, EngineConfig::default()).unwrap();
        controller.set_observer(Box::new(ChannelObserver::new(notice_tx.clone())));
        let renderer = PlayerRenderer::new(controller, command_rx, notice_tx);
        assert_send(&renderer);
    }
}
