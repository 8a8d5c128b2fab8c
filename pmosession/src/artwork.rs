//! Cover art retrieval and classification

use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

/// Image types a receiver accepts, guessed from the URL suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkKind {
    Jpeg,
    Png,
    Unsupported,
}

impl ArtworkKind {
    /// Classifies by the suffix of the URL path, ignoring query and fragment
    pub fn from_url(url: &str) -> Self {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_ascii_lowercase(),
            Err(_) => url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase(),
        };

        if path.ends_with(".jpg") || path.ends_with(".jpeg") {
            ArtworkKind::Jpeg
        } else if path.ends_with(".png") {
            ArtworkKind::Png
        } else {
            ArtworkKind::Unsupported
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ArtworkKind::Jpeg => Some("image/jpeg"),
            ArtworkKind::Png => Some("image/png"),
            ArtworkKind::Unsupported => None,
        }
    }
}

/// Image bytes of a supported type, ready to push to a receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    data: Bytes,
    content_type: &'static str,
    url: String,
}

impl Artwork {
    /// Wraps fetched bytes, or `None` when the URL suffix is not a supported image type
    pub fn classify(url: &str, data: Bytes) -> Option<Self> {
        let content_type = ArtworkKind::from_url(url).content_type()?;
        Some(Self {
            data,
            content_type,
            url: url.to_string(),
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Where the image was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Downloads cover art over HTTP
#[derive(Debug, Clone)]
pub struct ArtworkFetcher {
    client: Client,
}

impl ArtworkFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches the raw image bytes
    ///
    /// An absent or empty URL yields `None` without any network call; so
    /// does a failed download, which is logged.
    pub async fn fetch(&self, url: Option<&str>) -> Option<Bytes> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;

        match self.download(url).await {
            Ok(data) => {
                debug!(url, size = data.len(), "Artwork fetched");
                Some(data)
            }
            Err(err) => {
                warn!(url, error = %err, "Failed to fetch artwork");
                None
            }
        }
    }

    /// Fetches and classifies in one step
    ///
    /// Images of an unsupported type are dropped here so that nothing
    /// downstream pushes them.
    pub async fn fetch_artwork(&self, url: Option<&str>) -> Option<Artwork> {
        let data = self.fetch(url).await?;
        let url = url.unwrap_or_default().trim();
        let artwork = Artwork::classify(url, data);
        if artwork.is_none() {
            info!(url, "Unsupported artwork type, skipping");
        }
        artwork
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?)
    }
}
