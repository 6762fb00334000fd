//! WAV import/export for offline rendering and the native player.

use std::io::{Read, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::buffer::SourceBuffer;
use crate::error::{EngineError, Result};

pub fn read_wav(path: impl AsRef<Path>) -> Result<SourceBuffer> {
    read_wav_from(WavReader::open(path)?)
}

/// Decode to float. Channels beyond the second are dropped.
pub fn read_wav_from<R: Read>(mut reader: WavReader<R>) -> Result<SourceBuffer> {
    let spec = reader.spec();
    let samples: Vec<f32> = match (spec.bits_per_sample, spec.sample_format) {
        (32, SampleFormat::Float) => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (16, SampleFormat::Int) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        (24, SampleFormat::Int) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_607.0))
            .collect::<std::result::Result<_, _>>()?,
        (32, SampleFormat::Int) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        (bits, format) => {
            return Err(EngineError::UnsupportedWav {
                bits,
                format: match format {
                    SampleFormat::Float => "float",
                    SampleFormat::Int => "int",
                },
            })
        }
    };

    let channels = spec.channels.max(1) as usize;
    let kept = channels.min(2);
    let samples = if channels == kept {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .flat_map(|frame| frame[..kept].iter().copied())
            .collect()
    };
    SourceBuffer::new(samples, kept, spec.sample_rate as f32)
}

/// Write planar stereo as 32-bit float.
pub fn write_wav(path: impl AsRef<Path>, left: &[f32], right: &[f32], sample_rate: u32) -> Result<()> {
    let writer = WavWriter::create(path, stereo_spec(sample_rate))?;
    write_frames(writer, left, right)
}

pub fn write_wav_to<W: Write + Seek>(writer: W, left: &[f32], right: &[f32], sample_rate: u32) -> Result<()> {
    write_frames(WavWriter::new(writer, stereo_spec(sample_rate))?, left, right)
}

fn stereo_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

fn write_frames<W: Write + Seek>(mut writer: WavWriter<W>, left: &[f32], right: &[f32]) -> Result<()> {
    for (l, r) in left.iter().zip(right) {
        writer.write_sample(*l)?;
        writer.write_sample(*r)?;
    }
    writer.finalize()?;
    Ok(())
}
