//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A grain tried to read outside the source buffer.
    #[error("grain read at {offset:.4}s is outside the source buffer (duration {duration:.4}s)")]
    GrainOutOfRange { offset: f64, duration: f64 },

    /// The supplied buffer holds no frames.
    #[error("source buffer is empty")]
    EmptyBuffer,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// WAV data could not be read or written.
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    /// The WAV encoding is not one we decode.
    #[error("unsupported wav format: {bits}-bit {format}")]
    UnsupportedWav { bits: u16, format: &'static str },
}

/// Result type.
pub type Result<T> = std::result::Result<T, EngineError>;
