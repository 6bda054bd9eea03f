//! Configuration for opening a preference store

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::storage::{MemoryProvider, SqliteProvider, StorageProvider};
use crate::store::namespace_for;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "LIVEPREF_DATA_DIR";

/// Which storage provider backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefsConfig {
    /// Application id; the storage namespace is `<app_id>_prefs`
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Directory holding the SQLite databases
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub backend: BackendKind,
}

fn default_app_id() -> String {
    "livepref".to_string()
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            data_dir: None,
            backend: BackendKind::default(),
        }
    }
}

fn default_dir() -> Result<PathBuf> {
    let dir = if cfg!(target_os = "linux") {
        dirs::config_dir()
            .context("Failed to get XDG config directory")?
            .join("livepref")
    } else {
        dirs::home_dir()
            .context("Failed to get home directory")?
            .join(".livepref")
    };
    Ok(dir)
}

impl PrefsConfig {
    /// Path of the config file when none is given
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(default_dir()?.join("livepref.toml"))
    }

    /// Load configuration from `path` (or the default location).
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };
        debug!("Loading config from: {:?}", path);

        if !path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.app_id.is_empty() {
            anyhow::bail!("app_id must not be empty");
        }
        Ok(config)
    }

    /// Storage namespace derived from the application id
    pub fn namespace(&self) -> String {
        namespace_for(&self.app_id)
    }

    /// Data directory: `LIVEPREF_DATA_DIR`, then `data_dir`, then the platform default
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        self.data_dir_with_override(std::env::var(DATA_DIR_ENV).ok())
    }

    fn data_dir_with_override(&self, env_override: Option<String>) -> Result<PathBuf> {
        if let Some(dir) = env_override.filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_dir(),
        }
    }

    /// Build the storage provider selected by `backend`
    pub fn provider(&self) -> Result<Box<dyn StorageProvider>> {
        let provider: Box<dyn StorageProvider> = match self.backend {
            BackendKind::Sqlite => Box::new(SqliteProvider::new(self.resolve_data_dir()?)),
            BackendKind::Memory => Box::new(MemoryProvider::new()),
        };
        Ok(provider)
    }
}
