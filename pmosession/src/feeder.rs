//! Byte pump from the transcoder to the receiver
//!
//! [`HeartbeatReader`] wraps the source and stamps the shared
//! [`HeartbeatState`] on every non-empty read, so the watchdog sees exactly
//! the bytes that were handed to the receiver.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::heartbeat::HeartbeatState;
use crate::retry::RetryPolicy;
use crate::sink::{NowPlaying, Sink};

/// AsyncRead adapter recording a heartbeat per chunk
///
/// A read error from the wrapped source is remembered, so the feeder can
/// tell a dead source apart from a receiver failure.
pub struct HeartbeatReader<'h, R> {
    inner: R,
    heartbeat: &'h HeartbeatState,
    bytes_read: u64,
    source_error: Option<String>,
}

impl<'h, R> HeartbeatReader<'h, R> {
    pub fn new(inner: R, heartbeat: &'h HeartbeatState) -> Self {
        Self {
            inner,
            heartbeat,
            bytes_read: 0,
            source_error: None,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Last read error of the source, cleared by the call
    pub fn take_source_error(&mut self) -> Option<String> {
        self.source_error.take()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HeartbeatReader<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        if let Err(err) = ready!(Pin::new(&mut this.inner).poll_read(cx, buf)) {
            this.source_error = Some(err.to_string());
            return Poll::Ready(Err(err));
        }

        let read = buf.filled().len() - before;
        if read > 0 {
            this.bytes_read += read as u64;
            this.heartbeat.beat();
        }
        Poll::Ready(Ok(()))
    }
}

/// Streams one byte source into the receiver
pub struct Feeder<'a> {
    sink: &'a dyn Sink,
    retry: RetryPolicy,
}

impl<'a> Feeder<'a> {
    pub fn new(sink: &'a dyn Sink, retry: RetryPolicy) -> Self {
        Self { sink, retry }
    }

    /// Feeds `source` to the receiver until end of input
    ///
    /// A transient receiver failure restarts the transfer from the current
    /// read position. A failing source ends the feed with
    /// [`Error::Transcoder`] without retry, whatever the receiver reported.
    /// On success the group token is cancelled so that the
    /// sibling tasks wind down; if the token is cancelled first the feeder
    /// stops with [`Error::Canceled`].
    pub async fn run<R>(
        &self,
        source: R,
        now_playing: &NowPlaying,
        heartbeat: &HeartbeatState,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin,
    {
        let reader = Mutex::new(HeartbeatReader::new(source, heartbeat));
        let reader = &reader;
        let sink = self.sink;

        let streaming = self.retry.run("stream_bytes", move || async move {
            let mut guard = reader.lock().await;
            let result = sink.stream_bytes(&mut *guard, now_playing).await;
            match guard.take_source_error() {
                Some(reason) => Err(Error::transcoder(reason)),
                None => result.map_err(Error::from),
            }
        });

        let result = tokio::select! {
            result = streaming => result,
            _ = cancel.cancelled() => Err(Error::Canceled),
        };

        let bytes = reader.lock().await.bytes_read();
        match &result {
            Ok(()) => {
                info!(sink = sink.name(), bytes, "Source ended, stream complete");
                cancel.cancel();
            }
            Err(Error::Canceled) => info!(bytes, "Feeder canceled"),
            Err(err) => warn!(bytes, error = %err, "Feeder failed"),
        }
        result
    }
}
