//! # PMOStream Configuration Module
//!
//! This module provides configuration management for PMOStream, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Typed getters with defaults for configuration values
//!
//! Crates needing their own settings add them through an extension trait
//! implemented on [`Config`] (see `pmosession::SessionConfigExt`).
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let retries = config.get_u64(&["session", "retry_attempts"], 3);
//! let level = config.get_log_min_level();
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmostream.yaml");

const ENV_CONFIG_DIR: &str = "PMOSTREAM_CONFIG";
const ENV_PREFIX: &str = "PMOSTREAM_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmostream";
const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_LOG_MIN_LEVEL: &str = "info";

/// Configuration manager for PMOStream
///
/// The configuration is read once at startup and is immutable afterwards,
/// apart from [`Config::set_value`] which only touches the in-memory tree.
#[derive(Debug, Clone)]
pub struct Config {
    config_dir: Option<PathBuf>,
    path: Option<PathBuf>,
    data: Value,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    ///
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOSTREAM_CONFIG` environment variable
    /// 3. `.pmostream` in the current directory
    /// 4. `.pmostream` in the user's home directory
    ///
    /// Unlike a server, a one-shot session never creates the directory.
    fn find_config_dir(directory: &str) -> Option<PathBuf> {
        if !directory.is_empty() {
            return Some(PathBuf::from(directory));
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return Some(PathBuf::from(env_path));
        }

        let local = Path::new(CONFIG_DIR_NAME);
        if local.is_dir() {
            return Some(local.to_path_buf());
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.is_dir() {
                return Some(home_config);
            }
        }

        None
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies `PMOSTREAM_CONFIG__A__B` environment variable overrides
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory containing the config.yaml file, or empty to search the defaults
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);

        let path = config_dir
            .as_ref()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .filter(|file| file.is_file());

        let external = match &path {
            Some(file) => {
                let data = fs::read_to_string(file)
                    .map_err(|e| anyhow!("Cannot read {}: {}", file.display(), e))?;
                info!(config_file = %file.display(), "Loaded config file");
                Some(data)
            }
            None => {
                info!("Config file not found, using default embedded config");
                None
            }
        };

        let mut config = Self::from_layers(external.as_deref())?;
        config.config_dir = config_dir;
        config.path = path;
        config.apply_env_overrides(env::vars());
        Ok(config)
    }

    /// Builds a configuration from the embedded defaults merged with `yaml`
    ///
    /// No file or environment lookup takes place.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_layers(Some(yaml))
    }

    fn from_layers(external: Option<&str>) -> Result<Self> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        if let Some(yaml) = external {
            let external_value: Value = serde_yaml::from_str(yaml)?;
            // Un fichier vide se lit comme Null : rien à fusionner
            if !external_value.is_null() {
                merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));
            }
        }

        Ok(Config {
            config_dir: None,
            path: None,
            data: Self::lower_keys_value(default_value),
        })
    }

    /// Directory the configuration was searched in, if any
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// The config.yaml file that was merged, if one was found
    pub fn config_file(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies overrides of the form `PMOSTREAM_CONFIG__SECTION__KEY=value`
    ///
    /// Keys without the prefix are ignored. Values are parsed as YAML scalars
    /// so that `5` becomes a number and `true` a boolean.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key_path = suffix.split("__").collect::<Vec<_>>();
            let yaml_value = Self::convert_env_value(&value);
            if let Err(err) = Self::set_value_internal(&mut self.data, &key_path, yaml_value) {
                warn!(variable = %key, error = %err, "Ignoring configuration override");
            }
        }
    }

    /// Sets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["session", "retry_attempts"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&mut self, path: &[&str], value: Value) -> Result<()> {
        Self::set_value_internal(&mut self.data, path, value)
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let mut current = &self.data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                if let Some(next) = map.get(&Value::String(key.to_lowercase())) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Reads an unsigned integer, falling back to `default` when missing or invalid
    pub fn get_u64(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => match n.as_u64() {
                Some(v) => v,
                None => {
                    warn!(key = %path.join("."), value = %n, default, "Not an unsigned integer, using default");
                    default
                }
            },
            Ok(Value::String(s)) => s.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(key = %path.join("."), value = %s, default, "Invalid number, using default");
                default
            }),
            Ok(_) => {
                warn!(key = %path.join("."), default, "Not a number, using default");
                default
            }
            Err(_) => default,
        }
    }

    /// Reads a string, falling back to `default` when missing
    ///
    /// Numbers and booleans are rendered as text.
    pub fn get_string(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            Ok(Value::Bool(b)) => b.to_string(),
            Ok(Value::Null) | Err(_) => default.to_string(),
            Ok(_) => {
                warn!(key = %path.join("."), default, "Not a string, using default");
                default.to_string()
            }
        }
    }

    /// Reads a boolean, falling back to `default` when missing or invalid
    pub fn get_bool(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            _ => default,
        }
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> String {
        self.get_string(&["logger", "min_level"], DEFAULT_LOG_MIN_LEVEL)
            .to_lowercase()
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_embedded_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.get_u64(&["session", "retry_attempts"], 0), 3);
        assert_eq!(config.get_string(&["transcoder", "rtbufsize"], ""), "25M");
        assert_eq!(config.get_log_min_level(), "info");
        assert!(config.config_file().is_none());
    }

    #[test]
    fn test_external_yaml_overrides_defaults() {
        let config = Config::from_yaml_str(
            "Session:\n  Retry_Attempts: 5\nlogger:\n  min_level: DEBUG\n",
        )
        .unwrap();
        assert_eq!(config.get_u64(&["session", "retry_attempts"], 0), 5);
        // Les autres clés de la section sont conservées
        assert_eq!(config.get_u64(&["session", "file_pacing_secs"], 0), 1);
        assert_eq!(config.get_log_min_level(), "debug");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_yaml_str("").unwrap();
        config.apply_env_overrides(vars(&[
            ("PMOSTREAM_CONFIG__SESSION__RETRY_ATTEMPTS", "7"),
            ("PMOSTREAM_CONFIG__LINKPLAY__RELAY__ADVERTISED_HOST", "10.0.0.2"),
            ("UNRELATED", "1"),
        ]));
        assert_eq!(config.get_u64(&["session", "retry_attempts"], 0), 7);
        assert_eq!(
            config.get_string(&["linkplay", "relay", "advertised_host"], ""),
            "10.0.0.2"
        );
    }

    #[test]
    fn test_typed_getters_fallback() {
        let config =
            Config::from_yaml_str("session:\n  retry_attempts: many\n  file_pacing_secs: '4'\n")
                .unwrap();
        assert_eq!(config.get_u64(&["session", "retry_attempts"], 3), 3);
        assert_eq!(config.get_u64(&["session", "file_pacing_secs"], 1), 4);
        assert_eq!(config.get_u64(&["missing", "key"], 9), 9);
        assert!(config.get_bool(&["missing"], true));
    }

    #[test]
    fn test_get_value_missing_path() {
        let config = Config::from_yaml_str("").unwrap();
        let err = config.get_value(&["session", "nope"]).unwrap_err();
        assert!(err.to_string().contains("session.nope"));
    }

    #[test]
    fn test_set_value_creates_intermediate_maps() {
        let mut config = Config::from_yaml_str("").unwrap();
        config
            .set_value(&["extra", "nested", "flag"], Value::Bool(true))
            .unwrap();
        assert!(config.get_bool(&["extra", "nested", "flag"], false));
    }

    #[test]
    fn test_load_config_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "transcoder:\n  ffmpeg_path: /opt/ffmpeg/bin/ffmpeg\n",
        )
        .unwrap();

        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            config.get_string(&["transcoder", "ffmpeg_path"], "ffmpeg"),
            "/opt/ffmpeg/bin/ffmpeg"
        );
        assert_eq!(config.config_dir(), Some(dir.path()));
        assert!(config.config_file().is_some());
    }

    #[test]
    fn test_load_config_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert!(config.config_file().is_none());
        assert_eq!(config.get_u64(&["session", "discovery_timeout_secs"], 0), 5);
    }
}
