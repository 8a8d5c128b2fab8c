//! Error types for the LinkPlay receiver

use pmosession::SinkError;

/// Result type alias for LinkPlay operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The device answered with an error status
    #[error("Device returned HTTP {0}")]
    Status(u16),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The device does not know the command
    #[error("Command not supported: {0}")]
    Unsupported(String),

    /// The device answered something other than `OK`
    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for SinkError {
    fn from(err: Error) -> Self {
        match err {
            Error::Http(e) if e.is_connect() || e.is_timeout() => SinkError::Connection(e.to_string()),
            Error::Unsupported(cmd) => SinkError::Unsupported(cmd),
            Error::Io(e) => SinkError::Io(e.to_string()),
            other => SinkError::Protocol(other.to_string()),
        }
    }
}
