use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pmoconfig::Config;
use pmolinkplay::{LinkPlayConfigExt, LinkPlayConnector};
use pmosession::{
    AudioSource, FfmpegTranscoder, NotificationEndpoint, SessionConfig, SessionConfigExt,
    SessionOrchestrator,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pmostream", version, about = "Stream audio to a LinkPlay receiver")]
struct Args {
    /// Receiver identifier (host or host:port)
    #[arg(short = 'i', long = "id")]
    id: String,

    /// Title shown on the receiver
    #[arg(short = 't', long = "title")]
    title: Option<String>,

    /// Album shown on the receiver
    #[arg(short = 'a', long = "album")]
    album: Option<String>,

    #[arg(long = "artist")]
    artist: Option<String>,

    /// Radio stream URL, transcoded through ffmpeg
    #[arg(short = 'u', long = "stream_url", conflicts_with = "file")]
    stream_url: Option<String>,

    /// Audio file or .m3u/.m3u8 playlist
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Seconds without data before the session is aborted
    #[arg(short = 'o', long = "stream_timeout", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    stream_timeout: u64,

    /// JSON endpoint polled for the current song
    #[arg(short = 'm', long = "stream_metadata")]
    stream_metadata: Option<String>,

    /// Default cover URL
    #[arg(short = 'w', long = "stream_artwork")]
    stream_artwork: Option<String>,

    /// 0 leaves the volume unchanged
    #[arg(short = 'l', long = "volume", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: u8,

    #[arg(long = "telegram_update_token", env = "PMOSTREAM_TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_update_token: Option<String>,

    #[arg(long = "telegram_update_chat_id", env = "PMOSTREAM_TELEGRAM_CHAT_ID")]
    telegram_update_chat_id: Option<String>,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Configuration directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(&self.id)
            .with_volume(self.volume)
            .with_stall_timeout(Duration::from_secs(self.stream_timeout));

        if let Some(title) = &self.title {
            session = session.with_title(title);
        }
        if let Some(album) = &self.album {
            session = session.with_album(album);
        }
        if let Some(artist) = &self.artist {
            session = session.with_artist(artist);
        }
        if let Some(url) = &self.stream_url {
            session = session.with_source(AudioSource::Url(url.clone()));
        } else if let Some(file) = &self.file {
            session = session.with_source(AudioSource::from_path(file));
        }
        if let Some(url) = &self.stream_metadata {
            session = session.with_metadata_url(url);
        }
        if let Some(url) = &self.stream_artwork {
            session = session.with_artwork_url(url);
        }

        match (&self.telegram_update_token, &self.telegram_update_chat_id) {
            (Some(token), Some(chat_id)) => {
                session = session.with_notification(NotificationEndpoint::new(token, chat_id));
            }
            (None, None) => {}
            _ => warn!("Telegram notifications need both a token and a chat id, ignoring"),
        }
        session
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.get_log_min_level()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Cancels `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}

async fn run(args: Args) -> Result<ExitCode> {
    let config_dir = args
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let config = Config::load_config(&config_dir).context("Cannot load configuration")?;
    init_tracing(&config, args.verbose);

    let settings = config.get_engine_settings()?;
    let relay = config.get_relay_settings()?;
    let http = settings.http_client()?;

    let connector = LinkPlayConnector::new(http.clone(), relay);
    let transcoder = FfmpegTranscoder::new(settings.transcoder.clone());
    let orchestrator =
        SessionOrchestrator::new(connector, transcoder, settings)?.with_http_client(http);

    let session = args.session_config();

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(shutdown_signal(shutdown.clone()));

    let outcome = orchestrator.run(&session, shutdown.clone()).await;
    shutdown.cancel();
    let _ = signals.await;

    Ok(ExitCode::from(outcome.exit_code()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pmostream: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
