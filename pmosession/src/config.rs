//! Session parameters and engine tunables

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::heartbeat::DEFAULT_WATCHDOG_INTERVAL;
use crate::notify::{DEFAULT_TELEGRAM_API_URL, NotificationEndpoint};
use crate::playlist::{PlaylistEntry, PlaylistExpander};
use crate::retry::DEFAULT_MAX_ATTEMPTS;
use crate::sink::TrackMetadata;
use crate::transcoder::TranscoderSettings;

/// Default stall timeout for live streams
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_METADATA_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_METADATA_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_METADATA_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_FILE_PACING: Duration = Duration::from_secs(1);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Remote stream, transcoded before feeding
    Url(String),
    /// A single local file
    File(PathBuf),
    /// An M3U playlist of local files
    Playlist(PathBuf),
}

impl AudioSource {
    /// `Playlist` for `.m3u`/`.m3u8` paths, `File` otherwise
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if PlaylistExpander::is_playlist(&path) {
            AudioSource::Playlist(path)
        } else {
            AudioSource::File(path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Stream,
    Files,
    VolumeOnly,
}

/// Everything one session needs to know
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_id: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub source: Option<AudioSource>,
    pub metadata_url: Option<String>,
    pub artwork_url: Option<String>,
    /// 0 leaves the receiver volume untouched
    pub volume: u8,
    pub stall_timeout: Duration,
    pub notification: Option<NotificationEndpoint>,
}

impl SessionConfig {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            title: None,
            album: None,
            artist: None,
            source: None,
            metadata_url: None,
            artwork_url: None,
            volume: 0,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            notification: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_source(mut self, source: AudioSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = Some(url.into());
        self
    }

    pub fn with_artwork_url(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_notification(mut self, endpoint: NotificationEndpoint) -> Self {
        self.notification = Some(endpoint);
        self
    }

    pub fn mode(&self) -> SessionMode {
        match &self.source {
            Some(AudioSource::Url(_)) => SessionMode::Stream,
            Some(AudioSource::File(_)) | Some(AudioSource::Playlist(_)) => SessionMode::Files,
            None => SessionMode::VolumeOnly,
        }
    }

    /// Checks the configuration before anything touches the network
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::invalid_config("device identifier is empty"));
        }
        if self.volume > 100 {
            return Err(Error::invalid_config(format!(
                "volume {} is outside 0-100",
                self.volume
            )));
        }
        if self.stall_timeout.is_zero() {
            return Err(Error::invalid_config("stall timeout must be positive"));
        }

        match self.mode() {
            SessionMode::Stream => {
                if is_blank(&self.title) || is_blank(&self.album) {
                    return Err(Error::invalid_config(
                        "a title and an album are required when streaming a URL",
                    ));
                }
            }
            SessionMode::VolumeOnly if self.volume == 0 => {
                return Err(Error::nothing_to_do("no audio source and no volume change"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Configured metadata URL, or `None` with a warning when it does not parse
    pub fn valid_metadata_url(&self) -> Option<&str> {
        valid_url("metadata", self.metadata_url.as_deref())
    }

    /// Configured artwork URL, or `None` with a warning when it does not parse
    pub fn valid_artwork_url(&self) -> Option<&str> {
        valid_url("artwork", self.artwork_url.as_deref())
    }

    /// Static metadata announced when a live stream starts
    pub fn initial_track(&self) -> TrackMetadata {
        TrackMetadata::new(
            self.title.clone().unwrap_or_default(),
            self.album.clone().unwrap_or_default(),
        )
        .with_artist(self.artist.clone())
    }

    /// Metadata for one file: the configured title wins, then the file name
    pub fn track_for_entry(&self, entry: &PlaylistEntry) -> TrackMetadata {
        let title = self
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| entry.title())
            .unwrap_or_default();
        TrackMetadata::new(title, self.album.clone().unwrap_or_default())
            .with_artist(self.artist.clone())
    }

    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            Some(AudioSource::File(path)) | Some(AudioSource::Playlist(path)) => Some(path),
            _ => None,
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

fn valid_url<'a>(what: &str, url: Option<&'a str>) -> Option<&'a str> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(url),
        Ok(parsed) => {
            warn!(what, url, scheme = parsed.scheme(), "Unsupported URL scheme, ignoring");
            None
        }
        Err(err) => {
            warn!(what, url, error = %err, "Invalid URL, ignoring");
            None
        }
    }
}

/// Engine tunables, usually read from pmoconfig
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub discovery_timeout: Duration,
    pub watchdog_interval: Duration,
    pub metadata_poll_interval: Duration,
    pub file_pacing: Duration,
    pub retry_attempts: u32,
    pub http_timeout: Duration,
    pub transcoder: TranscoderSettings,
    pub telegram_api_url: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            metadata_poll_interval: DEFAULT_METADATA_POLL_INTERVAL,
            file_pacing: DEFAULT_FILE_PACING,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            transcoder: TranscoderSettings::default(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
        }
    }
}

impl EngineSettings {
    /// Keeps the metadata poll interval within 5-15 seconds
    pub fn clamp_poll_interval(interval: Duration) -> Duration {
        let clamped = interval.clamp(MIN_METADATA_POLL_INTERVAL, MAX_METADATA_POLL_INTERVAL);
        if clamped != interval {
            warn!(
                requested_secs = interval.as_secs(),
                used_secs = clamped.as_secs(),
                "Metadata poll interval out of range"
            );
        }
        clamped
    }

    /// HTTP client shared by the metadata, artwork and notification calls
    pub fn http_client(&self) -> Result<Client> {
        let client = Client::builder()
            .timeout(self.http_timeout)
            .user_agent(pmoutils::user_agent("PMOStream", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}
