//! Error types for the session engine

use std::time::Duration;

use crate::sink::SinkError;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a streaming session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No receiver answered for the configured identifier
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// No bytes reached the receiver for longer than the stall timeout
    #[error("Stream stalled: no data transferred for {0:?}")]
    StreamTimeout(Duration),

    /// A receiver operation failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The external transcoder could not be started or read
    #[error("Transcoder error: {0}")]
    Transcoder(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote endpoint answered with an error status
    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The session configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The session has no audio source, no volume change, or an empty playlist
    #[error("Nothing to do: {0}")]
    NothingToDo(String),

    /// The session was cancelled from outside
    #[error("Session canceled")]
    Canceled,
}

impl Error {
    /// Create a transcoder error
    pub fn transcoder(msg: impl Into<String>) -> Self {
        Self::Transcoder(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a "nothing to do" error
    pub fn nothing_to_do(msg: impl Into<String>) -> Self {
        Self::NothingToDo(msg.into())
    }
}
