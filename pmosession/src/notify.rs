//! Optional Telegram notification on track change
//!
//! Each successful metadata push posts the new track to a chat, with the
//! cover as photo when one is known. Delivery runs in the background and
//! never affects the session.

use std::fmt;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sink::TrackMetadata;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Bot token and chat receiving the notifications
#[derive(Clone, PartialEq, Eq)]
pub struct NotificationEndpoint {
    pub token: String,
    pub chat_id: String,
}

impl NotificationEndpoint {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }
}

impl fmt::Debug for NotificationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationEndpoint")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    api_url: String,
    endpoint: NotificationEndpoint,
}

impl Notifier {
    pub fn new(client: Client, api_url: &str, endpoint: NotificationEndpoint) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            endpoint,
        }
    }

    /// Title followed by the artist when known
    pub fn caption(track: &TrackMetadata) -> String {
        match &track.artist {
            Some(artist) if !artist.is_empty() => format!("{} — {}", track.title, artist),
            _ => track.title.clone(),
        }
    }

    /// Sends in the background; failures are only logged
    pub fn notify(&self, track: &TrackMetadata, artwork_url: Option<&str>) -> JoinHandle<()> {
        let notifier = self.clone();
        let caption = Self::caption(track);
        let artwork_url = artwork_url.map(str::to_string);

        tokio::spawn(async move {
            if let Err(err) = notifier.send(&caption, artwork_url.as_deref()).await {
                warn!(error = %err, "Telegram notification failed");
            }
        })
    }

    /// `sendPhoto` when an artwork URL is known, `sendMessage` otherwise
    pub async fn send(&self, caption: &str, artwork_url: Option<&str>) -> Result<()> {
        let (method, body) = match artwork_url.filter(|u| !u.is_empty()) {
            Some(photo) => (
                "sendPhoto",
                json!({ "chat_id": self.endpoint.chat_id, "photo": photo, "caption": caption }),
            ),
            None => (
                "sendMessage",
                json!({ "chat_id": self.endpoint.chat_id, "text": caption }),
            ),
        };

        // The token is part of the path: errors must not carry the URL
        let url = format!("{}/bot{}/{}", self.api_url, self.endpoint.token, method);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;
        let status = response.status();
        let reply: TelegramResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        if !status.is_success() || !reply.ok {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: format!(
                    "{}/bot<redacted>/{} ({})",
                    self.api_url,
                    method,
                    reply.description.unwrap_or_default()
                ),
            });
        }
        debug!(method, "Telegram notification sent");
        Ok(())
    }
}
