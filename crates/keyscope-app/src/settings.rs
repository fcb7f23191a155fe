//! Settings file utilities

use anyhow::{Context, Result};
use keyscope_core::ScanOptions;
use keyscope_driver_redis::RedisConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::{DEFAULT_FILTER, LoggingConfig};

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join("keyscope"))
}

pub fn settings_file() -> Result<PathBuf> {
    config_dir().map(|p| p.join("settings.toml"))
}

/// Scan defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub pattern: String,
    pub batch_size: usize,
    pub with_metadata: bool,
    pub limit: usize,
    pub batch_delay_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        let options = ScanOptions::default();
        Self {
            pattern: options.pattern,
            batch_size: options.batch_size,
            with_metadata: options.with_metadata,
            limit: options.limit,
            batch_delay_ms: 0,
        }
    }
}

impl ScanSettings {
    pub fn to_options(&self) -> ScanOptions {
        let mut options = ScanOptions::new()
            .with_pattern(self.pattern.clone())
            .with_batch_size(self.batch_size)
            .with_limit(self.limit)
            .with_batch_delay(Duration::from_millis(self.batch_delay_ms));
        if self.with_metadata {
            options = options.with_metadata();
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter when RUST_LOG is not set
    pub filter: String,
    /// Also write JSON logs to the data directory
    pub json_file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json_file: false,
        }
    }
}

impl LogSettings {
    pub fn to_config(&self) -> LoggingConfig {
        LoggingConfig {
            default_filter: self.filter.clone(),
            enable_json_logs: self.json_file,
            ..LoggingConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: RedisConfig,
    pub scan: ScanSettings,
    pub logging: LogSettings,
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`
    ///
    /// A missing file yields the defaults; an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (settings_file()?, false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))
    }
}
