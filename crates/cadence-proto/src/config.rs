use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::platform;

/// Overrides `api.base_url` when set.
pub const API_URL_ENV: &str = "CADENCE_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Remote catalog endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_songs_path")]
    pub songs_path: String,
    #[serde(default = "default_albums_path")]
    pub albums_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Periodic catalog refresh.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Minimum spacing between fetch attempts of the same resource.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Delay before the single retry after a connection reset.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Settle delay between switching tracks and starting playback.
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    /// Repeat clicks on the same track inside this window are ignored.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Local control API for front-ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            songs_path: default_songs_path(),
            albums_path: default_albums_path(),
        }
    }
}

impl ApiConfig {
    pub fn songs_url(&self) -> String {
        join_url(&self.base_url, &self.songs_path)
    }

    pub fn albums_url(&self) -> String {
        join_url(&self.base_url, &self.albums_path)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            start_delay_ms: default_start_delay_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn default_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_songs_path() -> String {
    "/api/song/list".to_string()
}

fn default_albums_path() -> String {
    "/api/album/list".to_string()
}

fn default_interval_secs() -> u64 {
    120
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_volume() -> f32 {
    crate::volume::DEFAULT_VOLUME
}

fn default_start_delay_ms() -> u64 {
    50
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    /// Load `config.toml`, writing defaults on first run.  `CADENCE_API_URL`
    /// wins over the file's `api.base_url`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml_str(&content)?
        } else {
            let config = Self::default();
            config.save()?;
            config
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api.base_url = url;
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
