//! CLI error type.

use std::fmt;

use tunevfs::config::ConfigError;
use tunevfs::vfs::VfsError;
use tunevfs::ServiceError;

/// Errors reported to the user before exiting.
#[derive(Debug)]
pub enum CliError {
    /// Configuration error.
    Config(String),

    /// Failed to start the VFS service.
    Service(ServiceError),

    /// Argument is neither a URI nor an existing path.
    InvalidUri(String),

    /// Query ended with a failure.
    Query(String),

    /// Query was cancelled before completing.
    Cancelled,

    /// VFS access failed.
    Vfs(VfsError),

    /// Failed to read cache statistics.
    CacheStats(String),

    /// Failed to clear the cache.
    CacheClear(String),

    /// Local I/O failed.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Service(e) => write!(f, "Failed to start service: {}", e),
            CliError::InvalidUri(arg) => write!(f, "Not a URI or existing path: {}", arg),
            CliError::Query(msg) => write!(f, "Query failed: {}", msg),
            CliError::Cancelled => write!(f, "Query cancelled"),
            CliError::Vfs(e) => write!(f, "{}", e),
            CliError::CacheStats(msg) => write!(f, "Failed to read cache statistics: {}", msg),
            CliError::CacheClear(msg) => write!(f, "Failed to clear cache: {}", msg),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Service(e) => Some(e),
            CliError::Vfs(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<VfsError> for CliError {
    fn from(e: VfsError) -> Self {
        CliError::Vfs(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
