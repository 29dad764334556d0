//! Configuration loading for the relay server.
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/relay/config.toml` (system)
//! 2. `~/.config/relay/config.toml` (user)
//! 3. `./relay.toml`, or a path passed explicitly (local/CLI override)
//! 4. Environment variables (`RELAY_*`)

mod loader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loader::{discover_config_files, load_with_sources, ConfigSources};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete relay server configuration. A pure function of its TOML file
/// and environment: loading the same inputs twice yields equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub workers: usize,
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub request_deadline_ms: u64,
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            workers: 4,
            pool_size: 8,
            queue_capacity: 256,
            request_deadline_ms: 30_000,
            log_filter: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Discover config files in the standard locations (optionally with a
    /// CLI-provided override path), load and overlay environment variables,
    /// then validate.
    pub fn load(cli_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = loader::load_with_sources(cli_path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
