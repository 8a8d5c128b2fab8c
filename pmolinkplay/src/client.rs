//! Client HTTP pour l'API `httpapi.asp` des appareils LinkPlay
//!
//! Toutes les commandes passent par `GET http://<hôte>/httpapi.asp?command=<cmd>`.
//! Les commandes d'action répondent `OK` en texte brut, les commandes d'état
//! répondent un objet JSON dont les valeurs numériques sont des chaînes.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

const STATUS_COMMAND: &str = "getStatusEx";
const PLAYER_STATUS_COMMAND: &str = "getPlayerStatus";

/// Identité de l'appareil renvoyée par `getStatusEx`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceStatus {
    #[serde(rename = "DeviceName", default)]
    pub device_name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub firmware: String,
    #[serde(default)]
    pub project: String,
}

/// Réponse brute de `getPlayerStatus`
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerStatus {
    pub status: String,
    #[serde(default)]
    pub vol: String,
}

impl PlayerStatus {
    /// Vrai tant que l'appareil lit ou charge un flux
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "play" | "load" | "buffering")
    }
}

#[derive(Debug, Clone)]
pub struct LinkPlayClient {
    http: Client,
    host: String,
}

impl LinkPlayClient {
    /// `host` est une adresse IP ou un nom d'hôte, avec port optionnel
    pub fn new(http: Client, host: impl Into<String>) -> Self {
        Self {
            http,
            host: host.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn command_url(&self, command: &str) -> String {
        format!("http://{}/httpapi.asp?command={}", self.host, command)
    }

    /// Envoie une commande et retourne le corps de la réponse
    pub async fn command(&self, command: &str) -> Result<String> {
        let url = self.command_url(command);
        debug!(host = %self.host, command, "LinkPlay command");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        let body = response.text().await?;

        if body.trim().eq_ignore_ascii_case("unknown command") {
            return Err(Error::Unsupported(command.to_string()));
        }
        Ok(body)
    }

    async fn action(&self, command: &str) -> Result<()> {
        let reply = self.command(command).await?;
        if reply.trim().eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(Error::UnexpectedReply {
                command: command.to_string(),
                reply: reply.trim().chars().take(80).collect(),
            })
        }
    }

    pub async fn device_status(&self) -> Result<DeviceStatus> {
        let body = self.command(STATUS_COMMAND).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn player_status(&self) -> Result<PlayerStatus> {
        let body = self.command(PLAYER_STATUS_COMMAND).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        self.action(&format!("setPlayerCmd:vol:{}", volume.min(100)))
            .await
    }

    /// Demande à l'appareil de lire l'URL donnée
    pub async fn play_url(&self, url: &str) -> Result<()> {
        self.action(&format!("setPlayerCmd:play:{}", percent_encode(url)))
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.action("setPlayerCmd:stop").await
    }
}

pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
