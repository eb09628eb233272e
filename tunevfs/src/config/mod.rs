//! Persistent configuration.
//!
//! Settings live in an INI file at `~/.tunevfs/config.ini`:
//!
//! ```ini
//! [cache]
//! directory = /home/user/.cache/tunevfs
//! min_file_size = 256
//!
//! [network]
//! timeout_secs = 30
//! max_response_size = 16777216
//!
//! [operations]
//! initial_wait_ms = 1000
//! notify_interval_ms = 1000
//!
//! [catalog]
//! authors_ttl_days = 30
//! tracks_ttl_days = 14
//! parties_ttl_days = 30
//! top_ttl_hours = 24
//! modarchive_key =
//!
//! [scanner]
//! queue_size = 100
//!
//! [logging]
//! level = info
//! directory =
//! ```
//!
//! Missing keys take their defaults; a missing file is the same as an empty
//! one.

mod file;
mod keys;

use std::path::PathBuf;

pub use file::{
    CacheSettings, ConfigError, ConfigFile, LoggingSettings, NetworkSettings, ScannerSettings,
};
pub use keys::ConfigKey;

/// Directory holding the configuration file.
pub const CONFIG_DIR_NAME: &str = ".tunevfs";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// `~/.tunevfs`, or `./.tunevfs` when the home directory is unknown.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Full path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Platform cache directory for downloaded content and catalog databases.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("tunevfs"))
        .unwrap_or_else(|| config_directory().join("cache"))
}
