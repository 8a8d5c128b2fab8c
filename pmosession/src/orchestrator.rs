//! Top-level session coordinator
//!
//! A session connects to the receiver, applies the volume, then runs the
//! mode-specific work:
//!
//! - **stream**: feeder, watchdog and metadata refresher run concurrently
//!   and the first failure ends the group;
//! - **files**: each file is streamed in order with a pacing delay between
//!   files;
//! - **volume-only**: nothing else.
//!
//! The receiver is closed on every path once it has been connected.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artwork::{Artwork, ArtworkFetcher};
use crate::config::{AudioSource, EngineSettings, SessionConfig};
use crate::error::{Error, Result};
use crate::feeder::Feeder;
use crate::heartbeat::{HeartbeatState, HeartbeatWatchdog};
use crate::metadata::{MetadataRefresher, MetadataSnapshot, MetadataSource};
use crate::notify::Notifier;
use crate::playlist::{PlaylistEntry, PlaylistExpander};
use crate::retry::RetryPolicy;
use crate::sink::{NowPlaying, Sink, SinkConnector};
use crate::transcoder::Transcoder;

/// Terminal result of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The source was exhausted normally
    Completed,
    /// The watchdog detected a stalled stream
    TimedOut,
    /// An unrecoverable error ended the session
    Failed(String),
    /// The session was stopped from outside
    Canceled,
}

impl SessionOutcome {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::StreamTimeout(_) => SessionOutcome::TimedOut,
            Error::Canceled => SessionOutcome::Canceled,
            other => SessionOutcome::Failed(other.to_string()),
        }
    }

    /// Process exit status: 0 for a clean or user-requested end, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionOutcome::Completed | SessionOutcome::Canceled => 0,
            SessionOutcome::TimedOut | SessionOutcome::Failed(_) => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::TimedOut => write!(f, "timed out"),
            SessionOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            SessionOutcome::Canceled => write!(f, "canceled"),
        }
    }
}

pub struct SessionOrchestrator {
    connector: Box<dyn SinkConnector>,
    transcoder: Box<dyn Transcoder>,
    settings: EngineSettings,
    client: Client,
}

impl SessionOrchestrator {
    pub fn new(
        connector: impl SinkConnector + 'static,
        transcoder: impl Transcoder + 'static,
        settings: EngineSettings,
    ) -> Result<Self> {
        let client = settings.http_client()?;
        Ok(Self {
            connector: Box::new(connector),
            transcoder: Box::new(transcoder),
            settings,
            client,
        })
    }

    /// Replaces the HTTP client used for metadata, artwork and notifications
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.settings.retry_attempts)
    }

    fn artwork_fetcher(&self) -> ArtworkFetcher {
        ArtworkFetcher::new(self.client.clone())
    }

    /// Runs one session to completion
    ///
    /// Cancelling `shutdown` stops the session at the next suspension point
    /// and yields [`SessionOutcome::Canceled`].
    pub async fn run(&self, config: &SessionConfig, shutdown: CancellationToken) -> SessionOutcome {
        if let Err(err) = config.validate() {
            error!(error = %err, "Session not started");
            return SessionOutcome::from_error(&err);
        }

        info!(device = %config.device_id, mode = ?config.mode(), "Starting session");

        let sink = match self.connect(&config.device_id, &shutdown).await {
            Ok(sink) => sink,
            Err(err) => {
                error!(error = %err, "Cannot reach receiver");
                return SessionOutcome::from_error(&err);
            }
        };

        let result = self.drive(sink.as_ref(), config, &shutdown).await;

        debug!(sink = sink.name(), "Closing receiver");
        sink.close().await;

        let outcome = match result {
            Ok(()) => SessionOutcome::Completed,
            Err(err) => SessionOutcome::from_error(&err),
        };
        match &outcome {
            SessionOutcome::Completed => info!("Session completed"),
            SessionOutcome::Canceled => warn!("Session canceled"),
            SessionOutcome::TimedOut => error!("Session ended: stream stalled"),
            SessionOutcome::Failed(reason) => error!(reason = %reason, "Session failed"),
        }
        outcome
    }

    async fn connect(&self, device_id: &str, shutdown: &CancellationToken) -> Result<Box<dyn Sink>> {
        let limit = self.settings.discovery_timeout;
        let attempt = timeout(limit, self.connector.connect(device_id, limit));

        tokio::select! {
            _ = shutdown.cancelled() => Err(Error::Canceled),
            result = attempt => match result {
                Ok(Ok(sink)) => {
                    info!(device = device_id, sink = sink.name(), "Receiver connected");
                    Ok(sink)
                }
                Ok(Err(err)) => Err(Error::DeviceNotFound(format!("{}: {}", device_id, err))),
                Err(_) => Err(Error::DeviceNotFound(format!(
                    "{}: no answer within {:?}",
                    device_id, limit
                ))),
            }
        }
    }

    async fn drive(&self, sink: &dyn Sink, config: &SessionConfig, shutdown: &CancellationToken) -> Result<()> {
        self.apply_volume(sink, config.volume).await;

        match &config.source {
            None => {
                info!("Volume-only session, nothing to stream");
                Ok(())
            }
            Some(AudioSource::Url(url)) => self.stream_url(sink, config, url, shutdown).await,
            Some(AudioSource::File(path)) => {
                let entries = vec![PlaylistEntry::new(path.clone())];
                self.stream_files(sink, config, &entries, shutdown).await
            }
            Some(AudioSource::Playlist(path)) => {
                let entries = PlaylistExpander::expand(path).await?;
                if entries.is_empty() {
                    return Err(Error::nothing_to_do(format!(
                        "playlist {} has no playable entry",
                        path.display()
                    )));
                }
                self.stream_files(sink, config, &entries, shutdown).await
            }
        }
    }

    /// Best effort: a receiver refusing the volume does not end the session
    async fn apply_volume(&self, sink: &dyn Sink, volume: u8) {
        if volume == 0 {
            return;
        }
        match self.retry().run("set_volume", move || sink.set_volume(volume)).await {
            Ok(()) => info!(volume, "Volume set"),
            Err(err) => warn!(volume, error = %err, "Could not set volume, continuing"),
        }
    }

    /// Downloads the configured cover, giving up as soon as `shutdown` fires
    async fn prefetch_artwork(
        &self,
        config: &SessionConfig,
        shutdown: &CancellationToken,
    ) -> Result<Option<Artwork>> {
        let fetcher = self.artwork_fetcher();
        tokio::select! {
            _ = shutdown.cancelled() => Err(Error::Canceled),
            artwork = fetcher.fetch_artwork(config.valid_artwork_url()) => Ok(artwork),
        }
    }

    async fn stream_url(
        &self,
        sink: &dyn Sink,
        config: &SessionConfig,
        url: &str,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let artwork = self.prefetch_artwork(config, shutdown).await?;
        let now_playing = NowPlaying::new(config.initial_track(), artwork);

        let source = tokio::select! {
            _ = shutdown.cancelled() => return Err(Error::Canceled),
            source = self.transcoder.open(url) => source?,
        };

        let heartbeat = HeartbeatState::new();
        let group = shutdown.child_token();

        let feeder = Feeder::new(sink, self.retry());
        let mut watchdog = HeartbeatWatchdog::new(config.stall_timeout, self.settings.watchdog_interval);
        let mut refresher = self.refresher(sink, config, &now_playing);

        let result = tokio::try_join!(
            feeder.run(source, &now_playing, &heartbeat, &group),
            watchdog.run(&heartbeat, &group),
            refresher.run(&group),
        );
        group.cancel();

        debug!(
            watchdog = ?watchdog.state(),
            metadata_pushes = refresher.push_count(),
            "Stream group finished"
        );
        result.map(|_| ())
    }

    fn refresher<'a>(
        &self,
        sink: &'a dyn Sink,
        config: &SessionConfig,
        now_playing: &NowPlaying,
    ) -> MetadataRefresher<'a> {
        let source = config
            .valid_metadata_url()
            .and_then(|url| match MetadataSource::new(self.client.clone(), url) {
                Ok(source) => Some(source),
                Err(err) => {
                    warn!(url, error = %err, "Ignoring metadata source");
                    None
                }
            });

        let notifier = config.notification.clone().map(|endpoint| {
            Notifier::new(self.client.clone(), &self.settings.telegram_api_url, endpoint)
        });

        let fallback_artwork = config.valid_artwork_url().map(str::to_string);
        let initial = MetadataSnapshot::from_track(&now_playing.track, fallback_artwork.clone());

        MetadataRefresher::new(
            sink,
            initial,
            self.artwork_fetcher(),
            self.retry(),
            EngineSettings::clamp_poll_interval(self.settings.metadata_poll_interval),
        )
        .with_source(source)
        .with_fallback_artwork(fallback_artwork)
        .with_notifier(notifier)
    }

    async fn stream_files(
        &self,
        sink: &dyn Sink,
        config: &SessionConfig,
        entries: &[PlaylistEntry],
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let artwork = self.prefetch_artwork(config, shutdown).await?;
        let retry = self.retry();
        let total = entries.len();

        for (index, entry) in entries.iter().enumerate() {
            if index > 0 {
                self.pace(shutdown).await?;
            }
            if shutdown.is_cancelled() {
                return Err(Error::Canceled);
            }

            let now_playing = NowPlaying::new(config.track_for_entry(entry), artwork.clone());
            info!(
                position = index + 1,
                total,
                path = %entry.path().display(),
                title = %now_playing.track.title,
                "Streaming file"
            );

            let path = entry.path();
            let now_playing = &now_playing;
            let streaming = retry.run("stream_file", move || sink.stream_file(path, now_playing));

            tokio::select! {
                _ = shutdown.cancelled() => return Err(Error::Canceled),
                result = streaming => result?,
            }
        }
        Ok(())
    }

    async fn pace(&self, shutdown: &CancellationToken) -> Result<()> {
        let delay: Duration = self.settings.file_pacing;
        tokio::select! {
            _ = shutdown.cancelled() => Err(Error::Canceled),
            _ = sleep(delay) => Ok(()),
        }
    }
}
