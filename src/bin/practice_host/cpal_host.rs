//! CPAL output: device selection, stream configuration and sample format conversion.

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize};
use dasp_sample::FromSample;
use log::{error, info, warn};

use crate::audio_buffer::CarryBuffer;
use crate::renderer::BlockRenderer;

const PREFERRED_SAMPLE_RATE: u32 = 48_000;
const HOST_BUFFER_FRAMES: u32 = 512;
// ALSA underruns easily with small periods.
const ALSA_BUFFER_FRAMES: u32 = 1024;
/// Frames per `PlaybackController::process` call.
pub const ENGINE_BLOCK_SIZE: usize = 128;

/// A running output stream. Dropping it stops playback.
pub struct AudioHost {
    _stream: cpal::Stream,
    sample_rate: f32,
}

struct OutputChoice {
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    host_name: String,
}

impl AudioHost {
    /// Open the default output and start it. `factory` receives the device sample rate.
    pub fn start<R, F>(factory: F) -> anyhow::Result<Self>
    where
        R: BlockRenderer,
        F: FnOnce(f32) -> anyhow::Result<R>,
    {
        let choice = select_output()?;
        let sample_rate = choice.config.sample_rate.0 as f32;
        let device_name = choice
            .device
            .name()
            .unwrap_or_else(|_| "unknown device".to_string());

        let renderer = factory(sample_rate)?;
        let carry = CarryBuffer::new(renderer, ENGINE_BLOCK_SIZE);
        let stream = match choice.sample_format {
            SampleFormat::F32 => build_stream::<f32, R>(&choice.device, &choice.config, carry)?,
            SampleFormat::I16 => build_stream::<i16, R>(&choice.device, &choice.config, carry)?,
            SampleFormat::U16 => build_stream::<u16, R>(&choice.device, &choice.config, carry)?,
            other => anyhow::bail!("unsupported sample format: {:?}", other),
        };
        stream.play().context("failed to start stream")?;

        info!(
            "output '{}' on {} at {} Hz, {} channel(s)",
            device_name, choice.host_name, sample_rate, choice.config.channels
        );
        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

fn select_output() -> anyhow::Result<OutputChoice> {
    let mut last_error = None;

    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id)?;
        let host_name = host_id.name().to_string();
        let Some(device) = host.default_output_device() else {
            last_error = Some(anyhow::anyhow!("host {} has no default output device", host_name));
            continue;
        };

        if let Ok(configs) = device.supported_output_configs() {
            let preferred = configs.into_iter().find(|c| {
                matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
                    && c.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                    && c.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
            });
            if let Some(supported) = preferred {
                let supported = supported.with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE));
                let sample_format = supported.sample_format();
                let mut config = supported.config();
                config.buffer_size = buffer_size(supported.buffer_size(), &host_name);
                return Ok(OutputChoice {
                    device,
                    config,
                    sample_format,
                    host_name,
                });
            }
        }

        match device.default_output_config() {
            Ok(supported) => {
                warn!(
                    "{} Hz unavailable on {}; using {} Hz",
                    PREFERRED_SAMPLE_RATE,
                    host_name,
                    supported.sample_rate().0
                );
                let sample_format = supported.sample_format();
                let mut config = supported.config();
                config.buffer_size = buffer_size(supported.buffer_size(), &host_name);
                return Ok(OutputChoice {
                    device,
                    config,
                    sample_format,
                    host_name,
                });
            }
            Err(err) => {
                last_error = Some(anyhow::anyhow!("no default output config on {}: {}", host_name, err));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no usable output device found")))
}

fn buffer_size(supported: &SupportedBufferSize, host_name: &str) -> BufferSize {
    let wanted = if host_name == "ALSA" {
        ALSA_BUFFER_FRAMES
    } else {
        HOST_BUFFER_FRAMES
    };
    match supported {
        // JACK picks its own period; the carry buffer absorbs whatever it asks for.
        SupportedBufferSize::Range { .. } if host_name == "JACK" => BufferSize::Default,
        SupportedBufferSize::Range { min, max } => BufferSize::Fixed(wanted.clamp(*min, *max)),
        SupportedBufferSize::Unknown => BufferSize::Fixed(wanted),
    }
}

fn build_stream<T, R>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut carry: CarryBuffer<R>,
) -> anyhow::Result<cpal::Stream>
where
    T: Sample + SizedSample + FromSample<f32>,
    R: BlockRenderer,
{
    let channels = config.channels as usize;
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                if channels == 0 {
                    return;
                }
                carry.pull(data.len() / channels, |frame, left, right| {
                    let out = &mut data[frame * channels..(frame + 1) * channels];
                    for (ch, sample) in out.iter_mut().enumerate() {
                        let value = match ch {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        };
                        *sample = T::from_sample(value);
                    }
                });
            },
            |err| error!("stream error: {}", err),
            None,
        )
        .context("failed to build output stream")?;
    Ok(stream)
}
