//! Application configuration.
//!
//! Stored as TOML at `~/.config/ideasbox/config.toml` (or XDG equivalent).
//! A missing file means defaults everywhere.
//!
//! ```toml
//! db_path = "/var/lib/ideasbox/ideasbox.db"
//! log_filter = "ideasbox=debug"
//!
//! [search]
//! page_size = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results per page in listings.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location; falls back to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// `tracing` filter directive used when `IDEASBOX_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub search: SearchConfig,
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// `$XDG_CONFIG_HOME/ideasbox/config.toml`, else the platform config dir.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config)
                .join("ideasbox")
                .join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("ideasbox").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.page_size == 0 {
            return Err(ConfigError::Validation(
                "search.page_size must be positive".into(),
            ));
        }
        if let Some(path) = &self.db_path
            && path.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation("db_path cannot be empty".into()));
        }
        Ok(())
    }

    /// `--db` flag, then the configured path, then the platform data dir.
    pub fn resolve_db_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.db_path.clone())
            .unwrap_or_else(default_db_path)
    }
}

pub fn default_db_path() -> PathBuf {
    default_data_dir().join("ideasbox.db")
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "ideasbox", "ideasbox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
