//! Error types for the voice agent client

use thiserror::Error;

/// Result type alias for voice agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice agent client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio payload could not be decoded (bad base64, misaligned PCM)
    #[error("decode error: {0}")]
    Decode(String),

    /// Output device unavailable, closed, or rejected a schedule request
    #[error("playback device error: {0}")]
    PlaybackDevice(String),

    /// WebSocket transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend endpoint reported a failure in its response body
    #[error("backend error: {0}")]
    Backend(String),

    /// Audio encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Self::Audio(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
