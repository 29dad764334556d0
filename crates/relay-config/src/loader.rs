use std::env;
use std::path::{Path, PathBuf};

use crate::{ConfigError, RelayConfig};

/// Information about where config values came from, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, in load order (later
/// wins): system, user, then local/CLI override. Only existing files are
/// returned.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/relay/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("relay/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("relay.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

pub fn load_with_sources(cli_path: Option<&Path>) -> Result<(RelayConfig, ConfigSources), ConfigError> {
    let mut config = RelayConfig::default();
    let mut sources = ConfigSources::default();

    for path in discover_config_files(cli_path) {
        let contents = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::FileRead { path: path.clone(), source })?;
        let parsed: RelayConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse { path: path.clone(), message: e.to_string() })?;
        config = parsed;
        sources.files.push(path);
    }

    apply_env_overrides(&mut config, &mut sources);
    Ok((config, sources))
}

fn apply_env_overrides(config: &mut RelayConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("RELAY_BIND") {
        config.bind = v;
        sources.env_overrides.push("RELAY_BIND".to_string());
    }
    if let Ok(v) = env::var("RELAY_WORKERS") {
        if let Ok(n) = v.parse() {
            config.workers = n;
            sources.env_overrides.push("RELAY_WORKERS".to_string());
        }
    }
    if let Ok(v) = env::var("RELAY_POOL_SIZE") {
        if let Ok(n) = v.parse() {
            config.pool_size = n;
            sources.env_overrides.push("RELAY_POOL_SIZE".to_string());
        }
    }
    if let Ok(v) = env::var("RELAY_QUEUE_CAPACITY") {
        if let Ok(n) = v.parse() {
            config.queue_capacity = n;
            sources.env_overrides.push("RELAY_QUEUE_CAPACITY".to_string());
        }
    }
    if let Ok(v) = env::var("RELAY_REQUEST_DEADLINE_MS") {
        if let Ok(n) = v.parse() {
            config.request_deadline_ms = n;
            sources.env_overrides.push("RELAY_REQUEST_DEADLINE_MS".to_string());
        }
    }
    if let Ok(v) = env::var("RELAY_LOG") {
        config.log_filter = v;
        sources.env_overrides.push("RELAY_LOG".to_string());
    }
}
