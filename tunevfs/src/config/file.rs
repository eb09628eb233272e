//! Typed view of the configuration file.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use super::{config_file_path, default_cache_directory, ConfigKey};
use crate::blob::DEFAULT_MIN_CACHED_SIZE;
use crate::catalog::CatalogConfig;
use crate::operation::EngineConfig;
use crate::remote::{DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_TIMEOUT_SECS};
use crate::scanner::DEFAULT_QUEUE_SIZE;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Root of the blob cache and the catalog databases.
    pub directory: PathBuf,
    /// Payloads below this size are not persisted.
    pub min_file_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            min_file_size: DEFAULT_MIN_CACHED_SIZE,
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
    pub max_response_size: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

/// `[scanner]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSettings {
    pub queue_size: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Directory for daily rolling log files; console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub network: NetworkSettings,
    pub operations: EngineConfig,
    pub catalog: CatalogConfig,
    pub scanner: ScannerSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads the user configuration file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Writes to the user configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes every non-empty setting to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Path of the catalog database named `name`.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.cache.directory.join(format!("{}.db", name))
    }

    /// Directory of the blob cache.
    pub fn blobs_directory(&self) -> PathBuf {
        self.cache.directory.join("blobs")
    }
}
