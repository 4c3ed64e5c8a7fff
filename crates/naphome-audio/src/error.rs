//! Error type shared by the parsers, the frame loop and the playback loop.

use thiserror::Error;

/// Why a playback request was refused or cut short.
///
/// None of these are fatal: the caller logs them and moves on to the next request.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The container is malformed (missing magic, missing `fmt `/`data` chunk).
    #[error("malformed audio: {0}")]
    Format(&'static str),
    /// Well-formed but outside what the codec path handles (non-PCM, non-16-bit,
    /// or an MP3 stream with no decodable frame).
    #[error("unsupported audio: {0}")]
    NotSupported(String),
    /// The output sink rejected a write or a reconfiguration.
    #[error("audio sink error: {0}")]
    Sink(String),
    /// Stopped by a cancel flag or because background audio was disabled.
    #[error("playback cancelled")]
    Cancelled,
}

impl AudioError {
    pub fn sink(err: impl std::fmt::Display) -> Self {
        AudioError::Sink(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;
