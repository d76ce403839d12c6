//! src/config.rs
//! ============================================================================
//! # Config: Scanner and Logging Configuration
//!
//! Loads and saves settings as TOML from the proper cross-platform config path
//! using the [`directories`](https://docs.rs/directories) crate. Every section
//! falls back to its defaults when missing, so a partial file is valid.
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! let scanner = Scanner::with_config(config.scan)?;
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use tokio::fs as TokioFs;

use crate::error::AppError;
use crate::logging::LoggerConfig;

/// Buffer size of each output stream unless configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Settings applied to every scan launched by a `Scanner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Capacity of the result stream and of the error stream. The walk runs
    /// ahead of the consumer by at most this many items per stream.
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.channel_capacity == 0 {
            return Err(AppError::invalid_input(
                "channel_capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,

    pub logging: LoggerConfig,
}

impl Config {
    /// Loads config from TOML file at the XDG-compliant app config dir, or
    /// writes and returns defaults.
    pub async fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            info!("Loading config from {}", path.display());

            Ok(Self::load_from(&path).await?)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(&path).await?;

            Ok(default_config)
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self, AppError> {
        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|e| AppError::config_io(path, e))?;

        let cfg: Self = toml::from_str(&text)?;
        cfg.scan.validate()?;

        Ok(cfg)
    }

    /// Saves config to the XDG-compliant app config dir.
    pub async fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path).await?;

        Ok(())
    }

    pub async fn save_to(&self, path: &Path) -> Result<(), AppError> {
        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::config_io(parent, e))?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str)
            .await
            .map_err(|e| AppError::config_io(path, e))?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "filescan", "FileScan")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;

        Ok(proj_dirs.config_dir().to_path_buf())
    }
}
