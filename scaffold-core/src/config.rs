//! Project configuration stored as TOML

use crate::monitor::{MonitorConfig, MonitorError, MonitoringRequest};
use crate::undo::UndoConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Location of the configuration relative to the project root
pub const DEFAULT_PATH: &str = ".scaffold/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid monitoring request: {0}")]
    Monitor(#[from] MonitorError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaffoldConfig {
    pub monitor: MonitorConfig,
    pub undo: UndoConfig,
}

impl ScaffoldConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: ScaffoldConfig = toml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or [`DEFAULT_PATH`] when none is given. A missing default
    /// file yields the default configuration; a missing explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Path::new(DEFAULT_PATH);
        if default_path.exists() {
            info!("Using configuration from {}", DEFAULT_PATH);
            Self::load(default_path)
        } else {
            info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let write_error = |source| ConfigError::Write { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
        }
        fs::write(path, content).map_err(write_error)?;
        Ok(())
    }

    /// Parse the encoded `[monitor] requests`
    pub fn monitoring_requests(&self) -> Result<Vec<MonitoringRequest>> {
        self.monitor
            .requests
            .iter()
            .map(|encoded| encoded.parse::<MonitoringRequest>().map_err(ConfigError::from))
            .collect()
    }
}
