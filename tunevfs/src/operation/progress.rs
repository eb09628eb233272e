//! Progress shared between a running operation and its pollers.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use super::result::QueryResult;
use crate::vfs::{ProgressCallback, VfsError, VfsResult};

/// Last reported `(done, total)` of an operation.
#[derive(Debug, Default)]
pub struct ProgressCell {
    done: AtomicU64,
    total: AtomicU64,
}

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, done: u64, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(done, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64) {
        (
            self.done.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    /// Snapshot as a [`QueryResult::Progress`].
    pub fn snapshot(&self) -> QueryResult {
        let (done, total) = self.get();
        QueryResult::Progress { done, total }
    }

    /// Callback recording into this cell and aborting once `cancel` fires.
    pub fn forwarder<'a>(&'a self, cancel: &'a CancellationToken) -> ProgressForwarder<'a> {
        ProgressForwarder { cell: self, cancel }
    }
}

/// [`ProgressCallback`] feeding a [`ProgressCell`].
pub struct ProgressForwarder<'a> {
    cell: &'a ProgressCell,
    cancel: &'a CancellationToken,
}

impl ProgressCallback for ProgressForwarder<'_> {
    fn on_progress(&self, done: u64, total: u64) -> VfsResult<()> {
        if self.cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }
        self.cell.set(done, total);
        Ok(())
    }
}

/// Fails with [`VfsError::Cancelled`] once `cancel` fired.
pub fn check_cancelled(cancel: &CancellationToken) -> VfsResult<()> {
    if cancel.is_cancelled() {
        Err(VfsError::Cancelled)
    } else {
        Ok(())
    }
}
