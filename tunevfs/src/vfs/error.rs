//! Error types for VFS operations.

use thiserror::Error;

use crate::catalog::StoreError;
use crate::decoder::DecodeError;
use crate::remote::RemoteError;

/// Result alias used throughout the VFS.
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors raised while resolving, enumerating or reading VFS objects.
///
/// Variants fall into a small taxonomy that drives propagation:
/// - [`VfsError::NotFound`] is a resolution failure, non-fatal to the session
/// - I/O, remote, parse, archive and decode failures are transient and only
///   retried on the next explicit request
/// - [`VfsError::Cancelled`] is a terminal state, not a failure
/// - [`VfsError::Fatal`] aborts the whole operation or scan
#[derive(Debug, Error)]
pub enum VfsError {
    /// Nothing matched the URI.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object exists but is of the wrong kind for the request.
    #[error("Not a {expected}: {uri}")]
    WrongKind { uri: String, expected: &'static str },

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote transport failure.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local catalog store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed remote response or playlist.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Archive could not be opened or the member is missing.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Module decoder failure.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Work was interrupted on request.
    #[error("Cancelled")]
    Cancelled,

    /// Unrecoverable failure that aborts the current operation or scan.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl VfsError {
    /// Returns true for errors that must abort a traversal.
    ///
    /// Everything else is reported per item and the walk continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VfsError::Fatal(_) | VfsError::Cancelled)
    }

    /// Returns true if this is the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VfsError::Cancelled)
    }

    pub(crate) fn not_found(uri: impl std::fmt::Display) -> Self {
        VfsError::NotFound(uri.to_string())
    }
}
