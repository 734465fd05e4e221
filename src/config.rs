//! Runtime configuration.
//!
//! Layers, lowest first: defaults, the JSON config file, environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::channel::Channel;

const CONFIG_PATH_VAR: &str = "MCPLINK_CONFIG";
const CHANNEL_VARS: [&str; 2] = ["MCPLINK_CHANNEL", "UPDATE_CHANNEL"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Channel whose scheme is used for generated links.
    pub channel: Channel,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// File the config was read from, if one existed.
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: Channel::Stable,
            log_filter: None,
            source: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    channel: Option<Channel>,
    log_filter: Option<String>,
}

impl Config {
    /// Resolve from the config file and the process environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::ReadFailed {
                    source,
                    path: path.to_path_buf(),
                })
            }
        };

        let file: ConfigFile =
            serde_json::from_str(&content).map_err(|source| ConfigError::ParseFailed {
                source,
                path: path.to_path_buf(),
            })?;

        Ok(Self {
            channel: file.channel.unwrap_or_default(),
            log_filter: file.log_filter.filter(|f| !f.trim().is_empty()),
            source: Some(path.to_path_buf()),
        })
    }

    /// Overlay channel variables. The first non-empty variable wins.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for var in CHANNEL_VARS {
            let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            self.channel = value
                .parse()
                .map_err(|_| ConfigError::InvalidChannel { var, value })?;
            break;
        }
        Ok(())
    }
}

/// `$MCPLINK_CONFIG` when set, otherwise `<config dir>/mcplink/config.json`.
pub fn config_path() -> PathBuf {
    if let Ok(val) = std::env::var(CONFIG_PATH_VAR) {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }
    dirs::config_dir()
        .map(|p| p.join("mcplink/config.json"))
        .unwrap_or_else(|| expand_tilde("~/.config/mcplink/config.json"))
}

fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    ReadFailed {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Failed to parse config {path}: {source}")]
    ParseFailed {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid channel in {var}: {value}")]
    InvalidChannel { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "channel": "beta", "logFilter": "mcplink=debug" }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.channel, Channel::Beta);
        assert_eq!(config.log_filter.as_deref(), Some("mcplink=debug"));
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "channel": "canary" }"#).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config {
            channel: Channel::Beta,
            ..Config::default()
        };
        config
            .apply_env(env(&[("UPDATE_CHANNEL", "nightly")]))
            .unwrap();
        assert_eq!(config.channel, Channel::Nightly);

        config
            .apply_env(env(&[("MCPLINK_CHANNEL", "stable"), ("UPDATE_CHANNEL", "beta")]))
            .unwrap();
        assert_eq!(config.channel, Channel::Stable);
    }

    #[test]
    fn test_env_ignores_blank_and_rejects_unknown() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("MCPLINK_CHANNEL", "  "), ("UPDATE_CHANNEL", "beta")]))
            .unwrap();
        assert_eq!(config.channel, Channel::Beta);

        let err = config
            .apply_env(env(&[("MCPLINK_CHANNEL", "canary")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannel { var: "MCPLINK_CHANNEL", .. }));
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("/etc/mcplink/config.json");
        assert_eq!(path, PathBuf::from("/etc/mcplink/config.json"));
    }
}
