//! Background scanning into a bounded queue.
//!
//! [`Scanner::spawn`] runs the walk on a blocking worker and hands modules
//! to the consumer through a bounded channel. A consumer that stops reading
//! suspends the walk instead of letting found modules pile up; dropping the
//! [`ScanHandle`] ends it.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ScanCallback, Scanner};
use crate::decoder::Module;
use crate::identifier::Identifier;
use crate::vfs::{VfsError, VfsResult};

/// Default capacity of the module queue.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Item of a background scan.
pub enum ScanEvent {
    /// Module found at `id`.
    Module {
        id: Identifier,
        module: Box<dyn Module>,
    },
    /// Item skipped because of a non-fatal error.
    Error { id: Identifier, message: String },
    /// Last event of the stream.
    Finished(ScanSummary),
}

/// Totals of a finished scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub modules: u64,
    pub errors: u64,
    /// Why the scan stopped early, if it did.
    pub aborted: Option<String>,
    pub cancelled: bool,
}

/// Consumer side of a background scan.
pub struct ScanHandle {
    events: mpsc::Receiver<ScanEvent>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Next event; `None` after [`ScanEvent::Finished`] was received.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for synchronous consumers.
    pub fn blocking_recv(&mut self) -> Option<ScanEvent> {
        self.events.blocking_recv()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

/// Forwards scan results into the queue.
struct QueueSink {
    events: mpsc::Sender<ScanEvent>,
    summary: ScanSummary,
}

impl ScanCallback for QueueSink {
    fn on_module(&mut self, id: Identifier, module: Box<dyn Module>) -> VfsResult<()> {
        self.events
            .blocking_send(ScanEvent::Module { id, module })
            // Consumer went away
            .map_err(|_| VfsError::Cancelled)?;
        self.summary.modules += 1;
        Ok(())
    }

    fn on_error(&mut self, id: &Identifier, error: &VfsError) {
        self.summary.errors += 1;
        let _ = self.events.blocking_send(ScanEvent::Error {
            id: id.clone(),
            message: error.to_string(),
        });
    }
}

impl Scanner {
    /// Scans `ids` on a blocking worker, delivering results through a queue
    /// of `queue_size` events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, ids: Vec<Identifier>, queue_size: usize) -> ScanHandle {
        let cancellation = self.cancel.child_token();
        let scanner = self.clone().with_cancellation(cancellation.clone());
        let (tx, rx) = mpsc::channel(queue_size.max(1));

        let task = tokio::task::spawn_blocking(move || {
            let mut sink = QueueSink {
                events: tx,
                summary: ScanSummary::default(),
            };
            match scanner.scan(&ids, &mut sink) {
                Ok(()) => {}
                Err(VfsError::Cancelled) => sink.summary.cancelled = true,
                Err(e) => sink.summary.aborted = Some(e.to_string()),
            }
            info!(
                modules = sink.summary.modules,
                errors = sink.summary.errors,
                cancelled = sink.summary.cancelled,
                "Background scan finished"
            );
            let QueueSink { events, summary } = sink;
            if events.blocking_send(ScanEvent::Finished(summary)).is_err() {
                debug!("Scan consumer gone before completion");
            }
        });

        ScanHandle {
            events: rx,
            cancellation,
            task,
        }
    }
}
