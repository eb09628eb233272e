//! Addressable configuration keys for `config get`/`config set`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::{ConfigError, ConfigFile};

const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// A single setting, named `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    CacheDirectory,
    CacheMinFileSize,
    NetworkTimeoutSecs,
    NetworkMaxResponseSize,
    OperationsInitialWaitMs,
    OperationsNotifyIntervalMs,
    CatalogAuthorsTtlDays,
    CatalogTracksTtlDays,
    CatalogPartiesTtlDays,
    CatalogTopTtlHours,
    CatalogModarchiveKey,
    ScannerQueueSize,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// Every key in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            CacheDirectory,
            CacheMinFileSize,
            NetworkTimeoutSecs,
            NetworkMaxResponseSize,
            OperationsInitialWaitMs,
            OperationsNotifyIntervalMs,
            CatalogAuthorsTtlDays,
            CatalogTracksTtlDays,
            CatalogPartiesTtlDays,
            CatalogTopTtlHours,
            CatalogModarchiveKey,
            ScannerQueueSize,
            LoggingLevel,
            LoggingDirectory,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            CacheDirectory | CacheMinFileSize => "cache",
            NetworkTimeoutSecs | NetworkMaxResponseSize => "network",
            OperationsInitialWaitMs | OperationsNotifyIntervalMs => "operations",
            CatalogAuthorsTtlDays | CatalogTracksTtlDays | CatalogPartiesTtlDays
            | CatalogTopTtlHours | CatalogModarchiveKey => "catalog",
            ScannerQueueSize => "scanner",
            LoggingLevel | LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            CacheDirectory => "directory",
            CacheMinFileSize => "min_file_size",
            NetworkTimeoutSecs => "timeout_secs",
            NetworkMaxResponseSize => "max_response_size",
            OperationsInitialWaitMs => "initial_wait_ms",
            OperationsNotifyIntervalMs => "notify_interval_ms",
            CatalogAuthorsTtlDays => "authors_ttl_days",
            CatalogTracksTtlDays => "tracks_ttl_days",
            CatalogPartiesTtlDays => "parties_ttl_days",
            CatalogTopTtlHours => "top_ttl_hours",
            CatalogModarchiveKey => "modarchive_key",
            ScannerQueueSize => "queue_size",
            LoggingLevel => "level",
            LoggingDirectory => "directory",
        }
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            CacheDirectory => config.cache.directory.display().to_string(),
            CacheMinFileSize => config.cache.min_file_size.to_string(),
            NetworkTimeoutSecs => config.network.timeout_secs.to_string(),
            NetworkMaxResponseSize => config.network.max_response_size.to_string(),
            OperationsInitialWaitMs => config.operations.initial_wait.as_millis().to_string(),
            OperationsNotifyIntervalMs => {
                config.operations.notify_interval.as_millis().to_string()
            }
            CatalogAuthorsTtlDays => (config.catalog.authors_ttl.as_secs() / SECS_PER_DAY).to_string(),
            CatalogTracksTtlDays => (config.catalog.tracks_ttl.as_secs() / SECS_PER_DAY).to_string(),
            CatalogPartiesTtlDays => {
                (config.catalog.parties_ttl.as_secs() / SECS_PER_DAY).to_string()
            }
            CatalogTopTtlHours => (config.catalog.top_ttl.as_secs() / SECS_PER_HOUR).to_string(),
            CatalogModarchiveKey => config.catalog.modarchive_key.clone(),
            ScannerQueueSize => config.scanner.queue_size.to_string(),
            LoggingLevel => config.logging.level.clone(),
            LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parses and stores `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            CacheDirectory => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.cache.directory = expand_home(value);
            }
            CacheMinFileSize => config.cache.min_file_size = self.number(value)?,
            NetworkTimeoutSecs => config.network.timeout_secs = self.positive(value)?,
            NetworkMaxResponseSize => {
                config.network.max_response_size = self.positive(value)? as usize
            }
            OperationsInitialWaitMs => {
                config.operations.initial_wait = Duration::from_millis(self.number(value)?)
            }
            OperationsNotifyIntervalMs => {
                config.operations.notify_interval = Duration::from_millis(self.positive(value)?)
            }
            CatalogAuthorsTtlDays => config.catalog.authors_ttl = self.days(value)?,
            CatalogTracksTtlDays => config.catalog.tracks_ttl = self.days(value)?,
            CatalogPartiesTtlDays => config.catalog.parties_ttl = self.days(value)?,
            CatalogTopTtlHours => {
                config.catalog.top_ttl = Duration::from_secs(self.number::<u64>(value)? * SECS_PER_HOUR)
            }
            CatalogModarchiveKey => config.catalog.modarchive_key = value.to_string(),
            ScannerQueueSize => config.scanner.queue_size = self.positive(value)? as usize,
            LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.logging.level = value.to_string();
            }
            LoggingDirectory => {
                config.logging.directory = (!value.is_empty()).then(|| expand_home(value));
            }
        }
        Ok(())
    }

    fn number<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value
            .parse()
            .map_err(|_| self.invalid(value, "expected a non-negative number"))
    }

    fn positive(&self, value: &str) -> Result<u64, ConfigError> {
        match self.number::<u64>(value)? {
            0 => Err(self.invalid(value, "must be greater than zero")),
            n => Ok(n),
        }
    }

    fn days(&self, value: &str) -> Result<Duration, ConfigError> {
        Ok(Duration::from_secs(self.number::<u64>(value)? * SECS_PER_DAY))
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Replaces a leading `~` with the home directory.
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(value),
        },
        None => PathBuf::from(value),
    }
}
