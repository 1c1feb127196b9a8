//! Error types for soundbite-player
//!
//! Every failure a play request can hit is one of these. The playback
//! controller absorbs them (log + silent no-op); they only cross the public
//! boundary from loading operations such as catalog parsing and buffer fetches.

use thiserror::Error;

/// Main error type for soundbite-player
#[derive(Error, Debug)]
pub enum Error {
    /// Clip catalog unreachable or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raw audio bytes could not be fetched
    #[error("Failed to load {file}: {reason}")]
    Load { file: String, reason: String },

    /// Audio data malformed or unsupported
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio device error: {0}")]
    Device(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared configuration layer
    #[error(transparent)]
    Common(#[from] soundbite_common::Error),
}

impl Error {
    /// Build a `Load` error for `file`
    pub fn load(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Load {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience Result type using soundbite-player Error
pub type Result<T> = std::result::Result<T, Error>;
