mod bus;
mod voice;

pub use bus::OutputBus;
pub use voice::{Voice, VoiceEvent, VoiceId, VoiceLoop, VoiceSpec};
