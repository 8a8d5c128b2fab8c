//! # pmolinkplay - récepteurs LinkPlay pour PMOStream
//!
//! Les appareils LinkPlay (WiiM, Arylic, Audio Pro...) se pilotent par
//! l'API HTTP `httpapi.asp` et ne savent lire que des URL. Ce crate expose
//! donc un petit serveur relais local : les octets du flux y sont poussés
//! et l'appareil les récupère sur `/stream`, avec métadonnées ICY en option
//! et la pochette sur `/artwork`.
//!
//! ```no_run
//! use std::time::Duration;
//! use pmolinkplay::{LinkPlayConnector, RelaySettings};
//! use pmosession::SinkConnector;
//!
//! # async fn demo() -> Result<(), pmosession::SinkError> {
//! let connector = LinkPlayConnector::new(reqwest::Client::new(), RelaySettings::default());
//! let sink = connector.connect("192.168.1.42", Duration::from_secs(5)).await?;
//! sink.set_volume(30).await?;
//! sink.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod icy;
pub mod relay;
pub mod sink;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use client::{DeviceStatus, LinkPlayClient, PlayerStatus};
pub use error::{Error, Result};
pub use icy::{IcyInjector, IcyMetadata};
pub use relay::{RelayServer, RelaySettings};
pub use sink::{LinkPlayConnector, LinkPlaySink};

#[cfg(feature = "pmoconfig")]
pub use config_ext::LinkPlayConfigExt;
