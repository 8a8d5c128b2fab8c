//! Receiver capability contract
//!
//! A [`Sink`] is a connected playback receiver. The engine never talks to a
//! wire protocol directly: it only feeds bytes, pushes metadata and artwork,
//! and sets the volume through this trait. Concrete receivers live in their
//! own crates (see `pmolinkplay`) and are reached through a [`SinkConnector`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::artwork::Artwork;

/// Textual now-playing information shown by the receiver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub album: String,
    pub artist: Option<String>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            album: album.into(),
            artist: None,
        }
    }

    pub fn with_artist(mut self, artist: Option<String>) -> Self {
        self.artist = artist;
        self
    }

    /// One-line rendering, `artist - title` or just `title`
    pub fn display_line(&self) -> String {
        match &self.artist {
            Some(artist) if !artist.is_empty() => format!("{} - {}", artist, self.title),
            _ => self.title.clone(),
        }
    }
}

/// Metadata and artwork handed to the receiver when a stream starts
#[derive(Debug, Clone, Default)]
pub struct NowPlaying {
    pub track: TrackMetadata,
    pub artwork: Option<Artwork>,
}

impl NowPlaying {
    pub fn new(track: TrackMetadata, artwork: Option<Artwork>) -> Self {
        Self { track, artwork }
    }
}

/// Errors reported by a receiver
///
/// [`SinkError::is_retryable`] decides which failures are worth another
/// attempt: a receiver that hung up or refused the request will not change
/// its mind.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The receiver tore the session down
    #[error("Connection torn down by receiver: {0}")]
    Teardown(String),

    /// The receiver could not be reached at connect time
    #[error("Receiver not found: {0}")]
    NotFound(String),

    /// The receiver does not implement the requested operation
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Transient network failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The receiver answered something unexpected
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Local IO failure while reading the source
    #[error("IO error: {0}")]
    Io(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SinkError::Teardown(_) | SinkError::NotFound(_) | SinkError::Unsupported(_)
        )
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}

/// A connected playback receiver
///
/// All operations take `&self`: metadata pushes happen while a stream is
/// being fed, so implementations synchronise internally.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human readable receiver name, for logs
    fn name(&self) -> &str;

    /// Set the playback volume, 0-100
    async fn set_volume(&self, volume: u8) -> Result<(), SinkError>;

    /// Stream bytes from `reader` until end of input
    ///
    /// A retried call continues from wherever the reader currently is.
    async fn stream_bytes(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        now_playing: &NowPlaying,
    ) -> Result<(), SinkError>;

    /// Stream a local audio file until it ends
    async fn stream_file(&self, path: &Path, now_playing: &NowPlaying) -> Result<(), SinkError>;

    /// Replace the displayed track information
    async fn set_metadata(&self, track: &TrackMetadata) -> Result<(), SinkError>;

    /// Replace the displayed cover art
    ///
    /// Callers only pass artwork whose content type was recognised.
    async fn set_artwork(&self, artwork: &Artwork) -> Result<(), SinkError>;

    /// Release the receiver. Must be safe to call more than once.
    async fn close(&self);
}

/// Locates receivers by identifier
#[async_trait]
pub trait SinkConnector: Send + Sync {
    async fn connect(&self, device_id: &str, timeout: Duration)
    -> Result<Box<dyn Sink>, SinkError>;
}
