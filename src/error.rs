use thiserror::Error;

/// All errors produced by sotto.
///
/// Only device-level and configuration errors are fatal to a session.
/// Conditioning and transcription failures are recovered per chunk inside
/// the consumer loop and never surface through this type to the host.
#[derive(Debug, Error)]
pub enum SottoError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("conditioning error: {0}")]
    Conditioning(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SottoError>;
