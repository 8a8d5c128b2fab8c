#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pmosession::{
    Artwork, ByteSource, EngineSettings, NowPlaying, Sink, SinkConnector, SinkError,
    TrackMetadata, Transcoder,
};
use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    SetVolume(u8),
    StreamBytes { title: String, has_artwork: bool },
    StreamFile { path: PathBuf, title: String },
    SetMetadata(TrackMetadata),
    SetArtwork { content_type: String, len: usize },
    Close,
}

/// Receiver double recording every call
#[derive(Debug, Default)]
pub struct MockSink {
    calls: Mutex<Vec<SinkCall>>,
    received: Mutex<Vec<u8>>,
    stream_errors: Mutex<VecDeque<SinkError>>,
    metadata_errors: Mutex<VecDeque<SinkError>>,
    volume_errors: Mutex<VecDeque<SinkError>>,
    artwork_errors: Mutex<VecDeque<SinkError>>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Errors returned, in order, by the next stream calls
    pub fn fail_streams(&self, errors: impl IntoIterator<Item = SinkError>) {
        self.stream_errors.lock().unwrap().extend(errors);
    }

    pub fn fail_metadata(&self, errors: impl IntoIterator<Item = SinkError>) {
        self.metadata_errors.lock().unwrap().extend(errors);
    }

    pub fn fail_volume(&self, errors: impl IntoIterator<Item = SinkError>) {
        self.volume_errors.lock().unwrap().extend(errors);
    }

    pub fn fail_artwork(&self, errors: impl IntoIterator<Item = SinkError>) {
        self.artwork_errors.lock().unwrap().extend(errors);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    pub fn metadata_pushes(&self) -> Vec<TrackMetadata> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::SetMetadata(track) => Some(track),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_error(queue: &Mutex<VecDeque<SinkError>>) -> Option<SinkError> {
        queue.lock().unwrap().pop_front()
    }

    async fn consume(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), SinkError> {
        if let Some(err) = Self::next_error(&self.stream_errors) {
            // Partial transfer before the failure
            let mut chunk = [0u8; 4];
            let n = reader.read(&mut chunk).await?;
            self.received.lock().unwrap().extend_from_slice(&chunk[..n]);
            return Err(err);
        }
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.received.lock().unwrap().extend_from_slice(&data);
        Ok(())
    }
}

/// `Box<dyn Sink>` view of a shared [`MockSink`]
pub struct SinkHandle(pub Arc<MockSink>);

#[async_trait]
impl Sink for SinkHandle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn set_volume(&self, volume: u8) -> Result<(), SinkError> {
        self.0.record(SinkCall::SetVolume(volume));
        match MockSink::next_error(&self.0.volume_errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stream_bytes(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        now_playing: &NowPlaying,
    ) -> Result<(), SinkError> {
        self.0.record(SinkCall::StreamBytes {
            title: now_playing.track.title.clone(),
            has_artwork: now_playing.artwork.is_some(),
        });
        self.0.consume(reader).await
    }

    async fn stream_file(&self, path: &Path, now_playing: &NowPlaying) -> Result<(), SinkError> {
        self.0.record(SinkCall::StreamFile {
            path: path.to_path_buf(),
            title: now_playing.track.title.clone(),
        });
        let mut file = tokio::fs::File::open(path).await?;
        self.0.consume(&mut file).await
    }

    async fn set_metadata(&self, track: &TrackMetadata) -> Result<(), SinkError> {
        self.0.record(SinkCall::SetMetadata(track.clone()));
        match MockSink::next_error(&self.0.metadata_errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn set_artwork(&self, artwork: &Artwork) -> Result<(), SinkError> {
        self.0.record(SinkCall::SetArtwork {
            content_type: artwork.content_type().to_string(),
            len: artwork.data().len(),
        });
        match MockSink::next_error(&self.0.artwork_errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        self.0.record(SinkCall::Close);
    }
}

pub struct MockConnector {
    sink: Arc<MockSink>,
    reachable: bool,
    pub connects: Arc<AtomicU32>,
}

impl MockConnector {
    pub fn new(sink: Arc<MockSink>) -> Self {
        Self {
            sink,
            reachable: true,
            connects: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn unreachable(sink: Arc<MockSink>) -> Self {
        Self {
            reachable: false,
            ..Self::new(sink)
        }
    }
}

#[async_trait]
impl SinkConnector for MockConnector {
    async fn connect(
        &self,
        device_id: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn Sink>, SinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(SinkError::NotFound(device_id.to_string()));
        }
        Ok(Box::new(SinkHandle(self.sink.clone())))
    }
}

pub enum Script {
    /// Yields these bytes then ends
    Bytes(Vec<u8>),
    /// Never yields anything
    Stall,
    /// Yields these bytes then fails like a crashed process
    Fail(Vec<u8>, String),
}

/// Transcoder double replaying a script instead of spawning ffmpeg
pub struct ScriptedTranscoder {
    script: Mutex<Option<Script>>,
    // Writers of stalled streams, kept open so reads stay pending
    stalled: Mutex<Vec<DuplexStream>>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTranscoder {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            stalled: Mutex::new(Vec::new()),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn open(&self, url: &str) -> pmosession::Result<ByteSource> {
        self.opened.lock().unwrap().push(url.to_string());
        match self.script.lock().unwrap().take() {
            Some(Script::Bytes(data)) => Ok(Box::new(std::io::Cursor::new(data))),
            Some(Script::Stall) => {
                let (writer, reader) = tokio::io::duplex(64);
                self.stalled.lock().unwrap().push(writer);
                Ok(Box::new(reader))
            }
            Some(Script::Fail(data, reason)) => Ok(Box::new(
                tokio_test::io::Builder::new()
                    .read(&data)
                    .read_error(std::io::Error::other(reason))
                    .build(),
            )),
            None => Err(pmosession::Error::transcoder("script already consumed")),
        }
    }
}

/// Engine settings with short delays for tests
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        file_pacing: Duration::from_millis(10),
        ..EngineSettings::default()
    }
}
