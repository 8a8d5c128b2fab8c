//! Extension pour intégrer les réglages du moteur de session dans pmoconfig
//!
//! Ce module fournit le trait `SessionConfigExt` qui lit les sections
//! `session`, `transcoder` et `notifications` de la configuration et en
//! construit un [`EngineSettings`].
//!
//! # Exemple
//!
//! ```no_run
//! use pmoconfig::Config;
//! use pmosession::SessionConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load_config("")?;
//! let settings = config.get_engine_settings()?;
//! println!("retries: {}", settings.retry_attempts);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Result, anyhow};
use pmoconfig::Config;

use crate::config::{
    DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_FILE_PACING, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_METADATA_POLL_INTERVAL, EngineSettings,
};
use crate::heartbeat::DEFAULT_WATCHDOG_INTERVAL;
use crate::notify::DEFAULT_TELEGRAM_API_URL;
use crate::retry::DEFAULT_MAX_ATTEMPTS;
use crate::transcoder::TranscoderSettings;

/// Trait d'extension pour lire les réglages du moteur depuis pmoconfig
pub trait SessionConfigExt {
    /// Délai maximal pour trouver le récepteur
    fn get_discovery_timeout(&self) -> Duration;

    /// Intervalle de vérification du watchdog
    fn get_watchdog_interval(&self) -> Duration;

    /// Intervalle de scrutation des métadonnées, borné à 5-15 secondes
    fn get_metadata_poll_interval(&self) -> Duration;

    /// Pause entre deux fichiers d'une playlist
    fn get_file_pacing(&self) -> Duration;

    /// Nombre de tentatives par opération sur le récepteur
    fn get_retry_attempts(&self) -> u32;

    fn get_http_timeout(&self) -> Duration;

    fn get_transcoder_settings(&self) -> TranscoderSettings;

    fn get_telegram_api_url(&self) -> String;

    /// Assemble tous les réglages ci-dessus
    fn get_engine_settings(&self) -> Result<EngineSettings>;
}

fn secs(config: &Config, key: &str, default: Duration) -> Duration {
    Duration::from_secs(config.get_u64(&["session", key], default.as_secs()))
}

impl SessionConfigExt for Config {
    fn get_discovery_timeout(&self) -> Duration {
        secs(self, "discovery_timeout_secs", DEFAULT_DISCOVERY_TIMEOUT)
    }

    fn get_watchdog_interval(&self) -> Duration {
        secs(self, "watchdog_interval_secs", DEFAULT_WATCHDOG_INTERVAL)
    }

    fn get_metadata_poll_interval(&self) -> Duration {
        EngineSettings::clamp_poll_interval(secs(
            self,
            "metadata_poll_interval_secs",
            DEFAULT_METADATA_POLL_INTERVAL,
        ))
    }

    fn get_file_pacing(&self) -> Duration {
        secs(self, "file_pacing_secs", DEFAULT_FILE_PACING)
    }

    fn get_retry_attempts(&self) -> u32 {
        let attempts = self.get_u64(&["session", "retry_attempts"], DEFAULT_MAX_ATTEMPTS as u64);
        u32::try_from(attempts).unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    fn get_http_timeout(&self) -> Duration {
        secs(self, "http_timeout_secs", DEFAULT_HTTP_TIMEOUT)
    }

    fn get_transcoder_settings(&self) -> TranscoderSettings {
        let defaults = TranscoderSettings::default();
        TranscoderSettings {
            ffmpeg_path: self.get_string(&["transcoder", "ffmpeg_path"], &defaults.ffmpeg_path),
            rtbufsize: self.get_string(&["transcoder", "rtbufsize"], &defaults.rtbufsize),
            output_format: self.get_string(&["transcoder", "output_format"], &defaults.output_format),
        }
    }

    fn get_telegram_api_url(&self) -> String {
        self.get_string(&["notifications", "telegram_api_url"], DEFAULT_TELEGRAM_API_URL)
    }

    fn get_engine_settings(&self) -> Result<EngineSettings> {
        let settings = EngineSettings {
            discovery_timeout: self.get_discovery_timeout(),
            watchdog_interval: self.get_watchdog_interval(),
            metadata_poll_interval: self.get_metadata_poll_interval(),
            file_pacing: self.get_file_pacing(),
            retry_attempts: self.get_retry_attempts(),
            http_timeout: self.get_http_timeout(),
            transcoder: self.get_transcoder_settings(),
            telegram_api_url: self.get_telegram_api_url(),
        };

        if settings.discovery_timeout.is_zero() {
            return Err(anyhow!("session.discovery_timeout_secs must be positive"));
        }
        if settings.watchdog_interval.is_zero() {
            return Err(anyhow!("session.watchdog_interval_secs must be positive"));
        }
        if settings.transcoder.ffmpeg_path.trim().is_empty() {
            return Err(anyhow!("transcoder.ffmpeg_path is empty"));
        }
        Ok(settings)
    }
}
