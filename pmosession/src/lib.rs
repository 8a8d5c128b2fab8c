//! Session orchestration engine for PMOStream
//!
//! This crate drives one playback session on a network audio receiver:
//! it feeds audio, watches for stalls, keeps the receiver's now-playing
//! display in sync with a live metadata feed, and always releases the
//! receiver at the end.
//!
//! # Components
//!
//! - [`SessionOrchestrator`]: connects, runs the session, returns a [`SessionOutcome`]
//! - [`Sink`] / [`SinkConnector`]: the receiver contract, implemented elsewhere
//! - [`Feeder`] and [`HeartbeatWatchdog`]: byte pump and stall detection
//! - [`MetadataRefresher`]: live metadata polling and pushes
//! - [`RetryPolicy`]: bounded immediate retries of receiver calls
//! - [`PlaylistExpander`] and [`ArtworkFetcher`]: input helpers
//! - [`Transcoder`]: turns a remote URL into bytes (ffmpeg by default)
//!
//! # Example
//!
//! ```no_run
//! use pmosession::{
//!     AudioSource, EngineSettings, FfmpegTranscoder, SessionConfig, SessionOrchestrator,
//!     SinkConnector,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(connector: impl SinkConnector + 'static) -> pmosession::Result<()> {
//! let settings = EngineSettings::default();
//! let transcoder = FfmpegTranscoder::new(settings.transcoder.clone());
//! let orchestrator = SessionOrchestrator::new(connector, transcoder, settings)?;
//!
//! let config = SessionConfig::new("192.168.1.42")
//!     .with_title("FIP")
//!     .with_album("Live")
//!     .with_source(AudioSource::Url("http://icecast.radiofrance.fr/fip-hifi.aac".into()))
//!     .with_volume(35);
//!
//! let outcome = orchestrator.run(&config, CancellationToken::new()).await;
//! std::process::exit(outcome.exit_code() as i32);
//! # }
//! ```

pub mod artwork;
pub mod config;
pub mod error;
pub mod feeder;
pub mod heartbeat;
pub mod metadata;
pub mod notify;
pub mod orchestrator;
pub mod playlist;
pub mod retry;
pub mod sink;
pub mod transcoder;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use artwork::{Artwork, ArtworkFetcher, ArtworkKind};
pub use config::{AudioSource, EngineSettings, SessionConfig, SessionMode};
pub use error::{Error, Result};
pub use feeder::{Feeder, HeartbeatReader};
pub use heartbeat::{HeartbeatState, HeartbeatWatchdog, WatchdogState};
pub use metadata::{MetadataRefresher, MetadataSnapshot, MetadataSource, RefreshOutcome};
pub use notify::{NotificationEndpoint, Notifier};
pub use orchestrator::{SessionOrchestrator, SessionOutcome};
pub use playlist::{PlaylistEntry, PlaylistExpander};
pub use retry::{RetryPolicy, Retryable};
pub use sink::{NowPlaying, Sink, SinkConnector, SinkError, TrackMetadata};
pub use transcoder::{ByteSource, FfmpegTranscoder, Transcoder, TranscoderSettings};

#[cfg(feature = "pmoconfig")]
pub use config_ext::SessionConfigExt;
