//! Browser bindings. The host decodes audio, calls `process` from its audio callback
//! and `animation_frame` from `requestAnimationFrame`.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Function;
use wasm_bindgen::prelude::*;

use crate::buffer::SourceBuffer;
use crate::config::EngineConfig;
use crate::controller::PlaybackController;
use crate::observer::PlaybackObserver;
use crate::params::LoopPointKind;
use crate::quality::QualityTier;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[derive(Default)]
struct JsCallbacks {
    time_update: Option<Function>,
    loop_count_update: Option<Function>,
    loop_complete: Option<Function>,
    quality_change: Option<Function>,
    playback_ended: Option<Function>,
}

/// Forwards notifications to whichever JS functions are registered.
struct JsObserver {
    callbacks: Rc<RefCell<JsCallbacks>>,
}

impl JsObserver {
    fn call(&self, pick: impl Fn(&JsCallbacks) -> Option<&Function>, arg: JsValue) {
        let callbacks = self.callbacks.borrow();
        if let Some(function) = pick(&callbacks) {
            if let Err(err) = function.call1(&JsValue::NULL, &arg) {
                log::warn!("playback callback threw: {:?}", err);
            }
        }
    }
}

impl PlaybackObserver for JsObserver {
    fn on_time_update(&mut self, current_time: f64) {
        self.call(|c| c.time_update.as_ref(), JsValue::from_f64(current_time));
    }

    fn on_loop_count_update(&mut self, count: u32) {
        self.call(|c| c.loop_count_update.as_ref(), JsValue::from(count));
    }

    fn on_loop_complete(&mut self) {
        self.call(|c| c.loop_complete.as_ref(), JsValue::UNDEFINED);
    }

    fn on_quality_change(&mut self, tier: QualityTier) {
        self.call(|c| c.quality_change.as_ref(), JsValue::from_str(tier.as_str()));
    }

    fn on_playback_ended(&mut self) {
        self.call(|c| c.playback_ended.as_ref(), JsValue::UNDEFINED);
    }
}

#[wasm_bindgen]
pub struct WasmPlayer {
    controller: PlaybackController,
    callbacks: Rc<RefCell<JsCallbacks>>,
}

#[wasm_bindgen]
impl WasmPlayer {
    /// `config` may be `undefined` or a partial camelCase config object.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f32, config: JsValue) -> Result<WasmPlayer, JsValue> {
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let mut controller = PlaybackController::new(sample_rate, config).map_err(js_error)?;
        let callbacks = Rc::new(RefCell::new(JsCallbacks::default()));
        controller.set_observer(Box::new(JsObserver {
            callbacks: Rc::clone(&callbacks),
        }));
        Ok(WasmPlayer {
            controller,
            callbacks,
        })
    }

    /// Load planar PCM. Pass `right` for stereo.
    pub fn load_pcm(&mut self, left: Vec<f32>, right: Option<Vec<f32>>, sample_rate: f32) -> Result<(), JsValue> {
        let buffer = match right {
            Some(right) => SourceBuffer::from_planar(&left, &right, sample_rate),
            None => SourceBuffer::mono(left, sample_rate),
        }
        .map_err(js_error)?;
        self.controller.load(buffer);
        Ok(())
    }

    /// Load a buffer produced by `decodeAudioData`. Only the first two channels are used.
    pub fn load_audio_buffer(&mut self, buffer: &web_sys::AudioBuffer) -> Result<(), JsValue> {
        let left = buffer.get_channel_data(0)?;
        let source = if buffer.number_of_channels() > 1 {
            let right = buffer.get_channel_data(1)?;
            SourceBuffer::from_planar(&left, &right, buffer.sample_rate())
        } else {
            SourceBuffer::mono(left, buffer.sample_rate())
        }
        .map_err(js_error)?;
        self.controller.load(source);
        Ok(())
    }

    pub fn unload(&mut self) {
        self.controller.unload();
    }

    pub fn play(&mut self) {
        self.controller.play();
    }

    pub fn pause(&mut self) {
        self.controller.pause();
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    pub fn seek(&mut self, seconds: f64) {
        self.controller.seek(seconds);
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        self.controller.set_playback_rate(rate)
    }

    pub fn set_pitch_shift(&mut self, semitones: f64) -> f64 {
        self.controller.set_pitch_shift(semitones)
    }

    /// `kind` is `"start"` or `"end"`. Returns the captured time, or `undefined` if rejected.
    pub fn set_loop_point(&mut self, kind: &str) -> Result<Option<f64>, JsValue> {
        let kind: LoopPointKind = kind.parse().map_err(js_error)?;
        Ok(self.controller.set_loop_point(kind))
    }

    pub fn set_loop(&mut self, start: f64, end: f64) -> bool {
        self.controller.set_loop(start, end).is_some()
    }

    pub fn clear_loop(&mut self) {
        self.controller.clear_loop();
    }

    pub fn set_max_loops(&mut self, max_loops: u32) {
        self.controller.set_max_loops(max_loops);
    }

    pub fn set_quality_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        let tier: QualityTier = mode.parse().map_err(js_error)?;
        self.controller.set_quality_mode(tier);
        Ok(())
    }

    pub fn set_adaptive_quality(&mut self, enabled: bool) {
        self.controller.set_adaptive_quality(enabled);
    }

    pub fn set_preserve_pitch(&mut self, preserve: bool) {
        self.controller.set_preserve_pitch(preserve);
    }

    pub fn set_volume(&mut self, gain: f32) {
        self.controller.set_volume(gain);
    }

    pub fn get_current_time(&self) -> f64 {
        self.controller.get_current_time()
    }

    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    pub fn animation_frame(&mut self) {
        self.controller.animation_frame();
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.controller.process(left, right);
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        Ok(serde_wasm_bindgen::to_value(&self.controller.state())?)
    }

    pub fn on_time_update(&mut self, callback: Function) {
        self.callbacks.borrow_mut().time_update = Some(callback);
    }

    pub fn on_loop_count_update(&mut self, callback: Function) {
        self.callbacks.borrow_mut().loop_count_update = Some(callback);
    }

    pub fn on_loop_complete(&mut self, callback: Function) {
        self.callbacks.borrow_mut().loop_complete = Some(callback);
    }

    pub fn on_quality_change(&mut self, callback: Function) {
        self.callbacks.borrow_mut().quality_change = Some(callback);
    }

    pub fn on_playback_ended(&mut self, callback: Function) {
        self.callbacks.borrow_mut().playback_ended = Some(callback);
    }
}
