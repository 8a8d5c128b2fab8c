//! Local HTTP relay the receiver pulls audio and artwork from
//!
//! LinkPlay devices only play URLs, so bytes fed by the session are queued
//! into a bounded channel and served on `/stream`. The current cover is
//! served on `/artwork`. A client that hangs up drops the channel receiver,
//! which the feeding side sees as a closed send.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use pmosession::TrackMetadata;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::icy::{DEFAULT_ICY_METAINT, IcyInjector, IcyMetadata};

/// Chunks buffered between the feeder and the HTTP client
pub const CHANNEL_CAPACITY: usize = 32;
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

const STREAM_CONTENT_TYPE: &str = "audio/mpeg";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// 0 picks a free port
    pub port: u16,
    /// Host put in URLs handed to the device; empty means the guessed local IP
    pub advertised_host: String,
    pub icy_metaint: usize,
    /// Read size when pumping the source
    pub chunk_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            port: 0,
            advertised_host: String::new(),
            icy_metaint: DEFAULT_ICY_METAINT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
struct ArtworkBlob {
    data: Bytes,
    content_type: &'static str,
}

struct RelayState {
    pending: Mutex<Option<mpsc::Receiver<Bytes>>>,
    metadata: watch::Sender<IcyMetadata>,
    artwork: watch::Sender<Option<ArtworkBlob>>,
    metaint: usize,
}

pub struct RelayServer {
    state: Arc<RelayState>,
    local_addr: SocketAddr,
    base_url: String,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    pub async fn start(settings: &RelaySettings) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", settings.port)).await?;
        let local_addr = listener.local_addr()?;

        let host = if settings.advertised_host.trim().is_empty() {
            pmoutils::guess_local_ip()
        } else {
            settings.advertised_host.trim().to_string()
        };
        let base_url = format!("http://{}:{}", host, local_addr.port());

        let state = Arc::new(RelayState {
            pending: Mutex::new(None),
            metadata: watch::Sender::new(IcyMetadata::default()),
            artwork: watch::Sender::new(None),
            metaint: settings.icy_metaint.max(1),
        });

        let router = Router::new()
            .route("/stream", get(stream_handler))
            .route("/artwork", get(artwork_handler))
            .with_state(state.clone());

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(err) = server.await {
                warn!(error = %err, "Relay server stopped with error");
            }
        });

        info!(%local_addr, %base_url, "Relay listening");
        Ok(Self {
            state,
            local_addr,
            base_url,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.base_url)
    }

    pub fn artwork_url(&self) -> String {
        format!("{}/artwork", self.base_url)
    }

    /// Opens a new stream; the previous one, if any, is abandoned
    ///
    /// The first client requesting `/stream` takes the receiving side.
    pub async fn publish(&self) -> mpsc::Sender<Bytes> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        *self.state.pending.lock().await = Some(receiver);
        sender
    }

    pub fn set_metadata(&self, track: &TrackMetadata) {
        self.state.metadata.send_modify(|meta| {
            meta.title = track.title.clone();
            meta.artist = track.artist.clone();
            meta.version += 1;
        });
    }

    /// Serves a new cover and points the stream metadata at it
    pub fn set_artwork(&self, data: Bytes, content_type: &'static str) {
        self.state
            .artwork
            .send_replace(Some(ArtworkBlob { data, content_type }));
        let base = self.artwork_url();
        self.state.metadata.send_modify(|meta| {
            meta.version += 1;
            // Cache buster so the device reloads the image
            meta.artwork_url = Some(format!("{}?v={}", base, meta.version));
        });
    }

    pub fn metadata(&self) -> IcyMetadata {
        self.state.metadata.borrow().clone()
    }

    /// Stops accepting connections and waits briefly for the server task
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.state.pending.lock().await.take();

        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        let abort = task.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Relay did not stop in time, aborting");
            abort.abort();
        }
        debug!(addr = %self.local_addr, "Relay stopped");
    }
}

async fn stream_handler(State(state): State<Arc<RelayState>>, headers: HeaderMap) -> Response {
    let Some(receiver) = state.pending.lock().await.take() else {
        return (StatusCode::NOT_FOUND, "no active stream").into_response();
    };

    let wants_icy = headers
        .get("icy-metadata")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "1")
        .unwrap_or(false);
    debug!(icy = wants_icy, "Receiver connected to relay stream");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(STREAM_CONTENT_TYPE));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(HeaderName::from_static("icy-name"), HeaderValue::from_static("PMOStream"));

    let body = if wants_icy {
        response_headers.insert(
            HeaderName::from_static("icy-metaint"),
            HeaderValue::from(state.metaint),
        );
        let injector = IcyInjector::new(state.metaint, state.metadata.subscribe());
        Body::from_stream(futures::stream::unfold(
            (receiver, injector),
            |(mut receiver, mut injector)| async move {
                let chunk = receiver.recv().await?;
                let data = injector.inject(&chunk);
                Some((Ok::<_, Infallible>(data), (receiver, injector)))
            },
        ))
    } else {
        Body::from_stream(futures::stream::unfold(receiver, |mut receiver| async move {
            let chunk = receiver.recv().await?;
            Some((Ok::<_, Infallible>(chunk), receiver))
        }))
    };

    (response_headers, body).into_response()
}

async fn artwork_handler(State(state): State<Arc<RelayState>>) -> Response {
    let artwork = state.artwork.borrow().clone();
    match artwork {
        Some(blob) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static(blob.content_type))],
            blob.data,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
