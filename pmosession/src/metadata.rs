//! Live metadata polling and receiver updates
//!
//! The remote source answers a JSON array whose first element may carry
//! `song`, `singer` and `cover`. Each poll starts from the previous snapshot
//! so that missing fields keep their last known value. A change of title
//! triggers a metadata push, then an artwork push, then a notification.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::artwork::ArtworkFetcher;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::sink::{Sink, TrackMetadata};

/// Last known now-playing state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSnapshot {
    pub title: String,
    pub album: String,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
    /// The last poll produced at least one usable field
    pub ready: bool,
}

impl MetadataSnapshot {
    pub fn from_track(track: &TrackMetadata, artwork_url: Option<String>) -> Self {
        Self {
            title: track.title.clone(),
            album: track.album.clone(),
            artist: track.artist.clone(),
            artwork_url,
            ready: false,
        }
    }

    pub fn track(&self) -> TrackMetadata {
        TrackMetadata::new(self.title.clone(), self.album.clone()).with_artist(self.artist.clone())
    }

    /// Overlays one remote payload on top of this snapshot
    ///
    /// `song` maps to the title, `singer` to the artist and `cover` to the
    /// artwork URL. Absent, null or empty fields keep the previous value.
    pub fn apply_payload(&self, body: &[u8]) -> Result<Self> {
        let entries: Vec<RemoteTrack> = serde_json::from_slice(body)?;
        let mut next = self.clone();
        next.ready = false;

        let Some(remote) = entries.into_iter().next() else {
            return Ok(next);
        };

        if let Some(song) = non_empty(remote.song) {
            next.title = song;
            next.ready = true;
        }
        if let Some(singer) = non_empty(remote.singer) {
            next.artist = Some(singer);
            next.ready = true;
        }
        if let Some(cover) = non_empty(remote.cover) {
            next.artwork_url = Some(cover);
            next.ready = true;
        }
        Ok(next)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteTrack {
    #[serde(default)]
    song: Option<String>,
    #[serde(default)]
    singer: Option<String>,
    #[serde(default)]
    cover: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// HTTP endpoint publishing the current track
#[derive(Debug, Clone)]
pub struct MetadataSource {
    client: Client,
    url: Url,
}

impl MetadataSource {
    pub fn new(client: Client, url: &str) -> Result<Self> {
        Ok(Self {
            client,
            url: Url::parse(url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Polls once; any status from 400 up is an error
    pub async fn fetch(&self, previous: &MetadataSnapshot) -> Result<MetadataSnapshot> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }
        let body = response.bytes().await?;
        previous.apply_payload(&body)
    }
}

/// What one refresh cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No metadata source configured
    NoSource,
    /// Source unreachable, malformed, or without usable fields
    NotReady,
    /// Title identical to the last pushed one
    Unchanged,
    /// The receiver accepted the new metadata
    Pushed,
    /// The receiver rejected the metadata after all retries
    PushFailed,
}

pub struct MetadataRefresher<'a> {
    sink: &'a dyn Sink,
    source: Option<MetadataSource>,
    artwork: ArtworkFetcher,
    fallback_artwork_url: Option<String>,
    notifier: Option<Notifier>,
    retry: RetryPolicy,
    poll_interval: Duration,
    current: MetadataSnapshot,
    last_pushed_title: String,
    pushes: u32,
}

impl<'a> MetadataRefresher<'a> {
    /// `initial` is what the receiver already shows; its title counts as pushed
    pub fn new(
        sink: &'a dyn Sink,
        initial: MetadataSnapshot,
        artwork: ArtworkFetcher,
        retry: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        let last_pushed_title = initial.title.clone();
        Self {
            sink,
            source: None,
            artwork,
            fallback_artwork_url: None,
            notifier: None,
            retry,
            poll_interval,
            current: initial,
            last_pushed_title,
            pushes: 0,
        }
    }

    pub fn with_source(mut self, source: Option<MetadataSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_fallback_artwork(mut self, url: Option<String>) -> Self {
        self.fallback_artwork_url = url;
        self
    }

    pub fn with_notifier(mut self, notifier: Option<Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn snapshot(&self) -> &MetadataSnapshot {
        &self.current
    }

    pub fn last_pushed_title(&self) -> &str {
        &self.last_pushed_title
    }

    /// Number of successful metadata pushes so far
    pub fn push_count(&self) -> u32 {
        self.pushes
    }

    /// Polls until the token is cancelled. Never fails the session.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(source) = &self.source else {
            debug!("No metadata source, refresher idle");
            cancel.cancelled().await;
            return Ok(());
        };
        info!(
            url = %source.url(),
            interval_secs = self.poll_interval.as_secs(),
            "Metadata refresher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = self.refresh_once(cancel) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    /// One poll-compare-push cycle
    pub async fn refresh_once(&mut self, cancel: &CancellationToken) -> RefreshOutcome {
        let Some(source) = &self.source else {
            return RefreshOutcome::NoSource;
        };

        let snapshot = match source.fetch(&self.current).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "Metadata source unavailable, keeping current metadata");
                return RefreshOutcome::NotReady;
            }
        };
        if !snapshot.ready {
            debug!("Metadata source returned no usable field");
            return RefreshOutcome::NotReady;
        }
        self.current = snapshot;

        if self.current.title == self.last_pushed_title {
            debug!(title = %self.current.title, "Metadata unchanged");
            return RefreshOutcome::Unchanged;
        }
        if cancel.is_cancelled() {
            return RefreshOutcome::Unchanged;
        }

        let sink = self.sink;
        let track = self.current.track();
        let pending = &track;
        let pushed = self
            .retry
            .run("set_metadata", move || sink.set_metadata(pending))
            .await;
        if let Err(err) = pushed {
            warn!(title = %track.title, error = %err, "Metadata push failed, will retry next cycle");
            return RefreshOutcome::PushFailed;
        }

        info!(title = %track.title, artist = ?track.artist, "Now playing");
        self.last_pushed_title = track.title.clone();
        self.pushes += 1;

        let artwork_url = self
            .current
            .artwork_url
            .clone()
            .or_else(|| self.fallback_artwork_url.clone());
        self.push_artwork(artwork_url.as_deref()).await;

        if let Some(notifier) = &self.notifier {
            notifier.notify(&track, artwork_url.as_deref());
        }
        RefreshOutcome::Pushed
    }

    async fn push_artwork(&self, url: Option<&str>) {
        let Some(artwork) = self.artwork.fetch_artwork(url).await else {
            return;
        };
        let sink = self.sink;
        let artwork = &artwork;
        if let Err(err) = self
            .retry
            .run("set_artwork", move || sink.set_artwork(artwork))
            .await
        {
            warn!(url = artwork.url(), error = %err, "Artwork push failed");
        }
    }
}
