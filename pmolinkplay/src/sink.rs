//! [`Sink`] implementation for LinkPlay receivers
//!
//! The device is told to play the relay URL, then the session bytes are
//! pushed through the relay while the device pulls them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pmosession::{Artwork, NowPlaying, Sink, SinkConnector, SinkError, TrackMetadata};
use reqwest::Client;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::client::LinkPlayClient;
use crate::relay::{RelayServer, RelaySettings};

const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LinkPlaySink {
    name: String,
    client: LinkPlayClient,
    relay: RelayServer,
    chunk_size: usize,
    closed: AtomicBool,
}

impl LinkPlaySink {
    pub fn new(name: impl Into<String>, client: LinkPlayClient, relay: RelayServer, chunk_size: usize) -> Self {
        Self {
            name: name.into(),
            client,
            relay,
            chunk_size: chunk_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn relay(&self) -> &RelayServer {
        &self.relay
    }

    async fn announce(&self, now_playing: &NowPlaying) {
        self.relay.set_metadata(&now_playing.track);
        if let Some(artwork) = &now_playing.artwork {
            self.relay
                .set_artwork(artwork.data().clone(), artwork.content_type());
        }
    }

    /// Pumps `reader` into a fresh relay stream the device has been told to play
    async fn pump(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64, SinkError> {
        let sender = self.relay.publish().await;
        self.client.play_url(&self.relay.stream_url()).await?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            if sender.send(Bytes::copy_from_slice(&buffer[..n])).await.is_err() {
                return Err(SinkError::Teardown(format!(
                    "{} closed the stream after {} bytes",
                    self.name, total
                )));
            }
            total += n as u64;
        }
        Ok(total)
    }

    /// Waits for the device to drain what the relay served
    async fn wait_playback_end(&self) {
        loop {
            tokio::time::sleep(PLAYBACK_POLL_INTERVAL).await;
            match self.client.player_status().await {
                Ok(status) if status.is_active() => continue,
                Ok(status) => {
                    debug!(device = %self.name, status = %status.status, "Playback ended");
                    return;
                }
                Err(err) => {
                    warn!(device = %self.name, error = %err, "Cannot poll player status");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Sink for LinkPlaySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_volume(&self, volume: u8) -> Result<(), SinkError> {
        self.client.set_volume(volume.min(100)).await?;
        Ok(())
    }

    async fn stream_bytes(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        now_playing: &NowPlaying,
    ) -> Result<(), SinkError> {
        self.announce(now_playing).await;
        let total = self.pump(reader).await?;
        info!(device = %self.name, bytes = total, "Stream input exhausted");
        Ok(())
    }

    async fn stream_file(&self, path: &Path, now_playing: &NowPlaying) -> Result<(), SinkError> {
        let mut file = tokio::fs::File::open(path).await?;
        self.announce(now_playing).await;
        let total = self.pump(&mut file).await?;
        debug!(device = %self.name, path = %path.display(), bytes = total, "File sent to relay");
        self.wait_playback_end().await;
        Ok(())
    }

    async fn set_metadata(&self, track: &TrackMetadata) -> Result<(), SinkError> {
        self.relay.set_metadata(track);
        Ok(())
    }

    async fn set_artwork(&self, artwork: &Artwork) -> Result<(), SinkError> {
        self.relay
            .set_artwork(artwork.data().clone(), artwork.content_type());
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.client.stop().await {
            warn!(device = %self.name, error = %err, "Failed to stop playback");
        }
        self.relay.shutdown().await;
        info!(device = %self.name, "Receiver released");
    }
}

/// Connects to LinkPlay devices addressed by host name or IP
pub struct LinkPlayConnector {
    http: Client,
    relay: RelaySettings,
}

impl LinkPlayConnector {
    pub fn new(http: Client, relay: RelaySettings) -> Self {
        Self { http, relay }
    }
}

#[async_trait]
impl SinkConnector for LinkPlayConnector {
    async fn connect(&self, device_id: &str, timeout: Duration) -> Result<Box<dyn Sink>, SinkError> {
        let client = LinkPlayClient::new(self.http.clone(), device_id);

        let status = match tokio::time::timeout(timeout, client.device_status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                return Err(SinkError::NotFound(format!("{}: {}", device_id, err)));
            }
            Err(_) => {
                return Err(SinkError::NotFound(format!(
                    "{}: no answer within {:?}",
                    device_id, timeout
                )));
            }
        };

        let relay = RelayServer::start(&self.relay)
            .await
            .map_err(|e| SinkError::Io(e.to_string()))?;

        let name = match status.device_name.trim() {
            "" => device_id.to_string(),
            name => name.to_string(),
        };
        info!(device = %name, host = %device_id, "Connected to LinkPlay receiver");

        Ok(Box::new(LinkPlaySink::new(name, client, relay, self.relay.chunk_size)))
    }
}
