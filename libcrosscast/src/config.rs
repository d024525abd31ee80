//! Configuration management for Crosscast
//!
//! Configuration is a TOML file resolved per the XDG Base Directory spec
//! (overridable via `CROSSCAST_CONFIG`). Durations are human-readable
//! strings ("15m", "10s") parsed lazily so a bad value fails loudly at
//! the call site that needs it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// OAuth application credentials per platform, required for token
    /// refresh. A platform without an entry can still sync until its
    /// access token expires.
    #[serde(default)]
    pub platforms: HashMap<Platform, OAuthApp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// How often the daemon runs a full sync cycle.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Worker pool size for concurrent connection syncs; independent of
    /// the connection count.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Page size for incremental post fetches.
    #[serde(default = "default_post_page_size")]
    pub post_page_size: usize,
    /// Per-request timeout for platform calls. Shorter than any
    /// user-facing request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Refresh tokens this close to expiry instead of waiting for a 401.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            workers: default_workers(),
            post_page_size: default_post_page_size(),
            request_timeout: default_request_timeout(),
            refresh_margin: default_refresh_margin(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Result<Duration> {
        parse_duration_field("sync.interval", &self.interval)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration_field("sync.request_timeout", &self.request_timeout)
    }

    pub fn refresh_margin(&self) -> Result<Duration> {
        parse_duration_field("sync.refresh_margin", &self.refresh_margin)
    }
}

/// OAuth application (client) credentials for one platform.
/// The secret never appears in `Debug` output.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: SecretString,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_interval() -> String {
    "15m".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_post_page_size() -> usize {
    50
}

fn default_request_timeout() -> String {
    "10s".to_string()
}

fn default_refresh_margin() -> String {
    "5m".to_string()
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("'{}' is not a duration: {}", value, e),
        }
        .into()
    })
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration.
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            server: ServerConfig::default(),
            sync: SyncConfig::default(),
            platforms: HashMap::new(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec.
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec.
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("crosscast"))
}
