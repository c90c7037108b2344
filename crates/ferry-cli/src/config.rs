//! Configuration file parsing for ferry.toml.

use ferry_core::BridgeConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names searched for, in order
const CONFIG_NAMES: &[&str] = &["ferry.toml", ".ferryrc.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Bridge behavior switches
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `ferry_core=debug`
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// Load configuration from a file or search for a default config file.
///
/// An explicit `path` must exist; without one, a missing file means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) if !path.exists() => {
            anyhow::bail!("Config file not found: {}", path.display())
        }
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_config_file(&cwd)),
    };

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Search `start` and its parents for a config file.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}
