//! Configuration loading and management.
//!
//! A TOML file supplies the structured configuration; deploy-sensitive
//! values (chat token, client id, channels, database path) can be overridden
//! through environment variables so containerized deployments work without a
//! config file at all.

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat connection settings.
    pub chat: ChatConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Health endpoint settings.
    pub health: HealthConfig,
}

/// Chat-protocol client settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// OAuth token for the chat protocol. Usually supplied via
    /// `CHATKEEPER_TOKEN`.
    pub token: Option<String>,
    /// Platform client id. Usually supplied via `CHATKEEPER_CLIENT_ID`.
    pub client_id: Option<String>,
    /// Channels to join at startup.
    pub channels: Vec<String>,
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (`:memory:` for ephemeral runs).
    pub path: String,
    /// Connection attempts before giving up.
    pub max_connect_retries: u32,
    /// Fixed delay between connection attempts, in seconds.
    pub retry_delay_secs: u64,
    /// Default message retention window for newly provisioned channels.
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "chatkeeper.db".to_string(),
            max_connect_retries: 3,
            retry_delay_secs: 5,
            retention_days: 30,
        }
    }
}

/// Health endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Port for the health HTTP server. 0 disables the endpoint.
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from a TOML file if it exists, otherwise start from defaults.
    /// Environment overrides are applied either way.
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        let mut config = match std::fs::metadata(path) {
            Ok(_) => Self::load(path)?,
            Err(_) => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment-variable overrides for deploy-sensitive values.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("CHATKEEPER_TOKEN") {
            self.chat.token = Some(token);
        }
        if let Ok(client_id) = std::env::var("CHATKEEPER_CLIENT_ID") {
            self.chat.client_id = Some(client_id);
        }
        if let Ok(channels) = std::env::var("CHATKEEPER_CHANNELS") {
            self.chat.channels = split_channels(&channels);
        }
        if let Ok(path) = std::env::var("CHATKEEPER_DB_PATH") {
            self.database.path = path;
        }
    }
}

/// Split a comma-separated channel list, dropping empty entries.
pub fn split_channels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
