//! Lecture de la section `linkplay` de pmoconfig
//!
//! ```yaml
//! linkplay:
//!   relay:
//!     port: 0
//!     advertised_host: ""
//!     icy_metaint: 16000
//!     chunk_size: 8192
//! ```

use anyhow::{Result, anyhow};
use pmoconfig::Config;

use crate::relay::RelaySettings;

pub trait LinkPlayConfigExt {
    /// Réglages du relais HTTP local, validés
    fn get_relay_settings(&self) -> Result<RelaySettings>;
}

impl LinkPlayConfigExt for Config {
    fn get_relay_settings(&self) -> Result<RelaySettings> {
        let defaults = RelaySettings::default();
        let relay = |key: &str, default: u64| self.get_u64(&["linkplay", "relay", key], default);

        let port = relay("port", defaults.port as u64);
        let port = u16::try_from(port).map_err(|_| anyhow!("linkplay.relay.port out of range: {}", port))?;

        let icy_metaint = relay("icy_metaint", defaults.icy_metaint as u64) as usize;
        if icy_metaint == 0 {
            return Err(anyhow!("linkplay.relay.icy_metaint must be positive"));
        }
        let chunk_size = relay("chunk_size", defaults.chunk_size as u64) as usize;
        if chunk_size == 0 {
            return Err(anyhow!("linkplay.relay.chunk_size must be positive"));
        }

        Ok(RelaySettings {
            port,
            advertised_host: self
                .get_string(&["linkplay", "relay", "advertised_host"], "")
                .trim()
                .to_string(),
            icy_metaint,
            chunk_size,
        })
    }
}
