//! Conductor settings persisted as TOML

use std::path::{Path, PathBuf};

use ostinato_core::StageConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub stage: StageConfig,
    /// Sample directory scanned at startup
    pub samples: Option<PathBuf>,
    /// Scheduler wake-up interval in milliseconds
    pub tick_ms: u64,
    /// Bundles buffered for the consumer before new ones are dropped
    pub channel_capacity: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            stage: StageConfig::default(),
            samples: None,
            tick_ms: 5,
            channel_capacity: 256,
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ostinato")
        .join("config.toml")
}

/// Load the user config, falling back to defaults when absent or invalid
pub fn load_config() -> ConductorConfig {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> ConductorConfig {
    let Ok(s) = std::fs::read_to_string(path) else {
        return ConductorConfig::default();
    };
    match toml::from_str(&s) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %path.display(), "invalid config, using defaults: {err}");
            ConductorConfig::default()
        }
    }
}

pub fn save_config(config: &ConductorConfig) {
    save_to(&config_path(), config);
}

pub fn save_to(path: &Path, config: &ConductorConfig) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(s) = toml::to_string_pretty(config) else { return };
    if let Err(err) = std::fs::write(path, s) {
        warn!(path = %path.display(), "could not write config: {err}");
    }
}
