//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub statistics: StatisticsConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chunk cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds of samples per cached chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: f64,

    /// Seconds of events per cached chunk
    #[serde(default = "default_chunk_size")]
    pub event_chunk_size: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_chunk_size() -> f64 {
    5.0
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            chunk_size: default_chunk_size(),
            event_chunk_size: default_chunk_size(),
        }
    }
}

/// Precomputed statistics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

/// Live UDP reader configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_remote_port")]
    pub port: u16,

    /// Only datagrams carrying this id are accepted
    #[serde(default)]
    pub remote_id: i64,

    /// Values per datagram
    #[serde(default = "default_remote_sensors")]
    pub sensors: usize,

    /// Append-only file of accepted datagrams, replayed on start
    pub data_file: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_remote_port() -> u16 {
    7331
}

fn default_remote_sensors() -> usize {
    1
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_remote_port(),
            remote_id: 0,
            sensors: default_remote_sensors(),
            data_file: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("labreader").join("config.toml")),
            Some(PathBuf::from("./labreader.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Cache overrides
        if let Some(size) = var("LABREADER_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.chunk_size = size;
        }
        if let Some(size) = var("LABREADER_EVENT_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.event_chunk_size = size;
        }

        // Remote overrides
        if let Some(port) = var("LABREADER_REMOTE_PORT").and_then(|v| v.parse().ok()) {
            self.remote.port = port;
        }

        // Logging overrides
        if let Some(level) = var("LABREADER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LABREADER_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# labreader configuration
#
# Environment variables override these settings:
# - LABREADER_CHUNK_SIZE
# - LABREADER_EVENT_CHUNK_SIZE
# - LABREADER_REMOTE_PORT
# - LABREADER_LOG_LEVEL
# - LABREADER_LOG_FORMAT

[cache]
# Cache opened files in fixed-size time chunks
enabled = true

# Seconds of samples per chunk
chunk_size = 5.0

# Seconds of events per chunk
event_chunk_size = 5.0

[statistics]
# Precompute min/max/avg/median/variance when a file is opened
enabled = true

[remote]
# Address and UDP port the live reader listens on
bind_addr = "0.0.0.0"
port = 7331

# Only datagrams with this id are accepted
remote_id = 0

# Number of values per datagram
sensors = 1

# Optional file that keeps received samples across restarts
# data_file = "/var/lib/labreader/remote.bin"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
