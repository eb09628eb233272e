//! Bounded-latency execution of slow operations.
//!
//! The [`OperationEngine`] turns a blocking computation into a pollable
//! task. A query either returns the final result within the initial wait
//! or registers the running task under its key and answers with a
//! progress snapshot; the caller re-issues the same query to poll.
//!
//! # Architecture
//!
//! ```text
//!  query(key) ──► ┌──────────────┐
//!                 │   Registry   │──► holder exists ──► final result? ──► deliver + deregister
//!                 └──────┬───────┘                           │ no
//!                        │ new                                └──► status() snapshot
//!                        ▼
//!                 ┌──────────────┐     spawn_blocking
//!                 │   Factory    │──► Operation::call(cancel) ──► watch slot
//!                 └──────┬───────┘
//!                        ▼
//!                 wait ≤ initial_wait
//!                   │ done            │ timeout
//!                   ▼                 ▼
//!             deregister,       start notifier ("re-query key" every interval),
//!             return result     return status() snapshot
//! ```
//!
//! At most one holder exists per key: the registry lock is held across the
//! lookup and the insertion, and the holder is inserted before waiting.
//! Cancellation is a silent terminal state, never a failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::result::{QueryResult, Row};
use crate::vfs::VfsResult;

// =============================================================================
// Configuration
// =============================================================================

/// Default bound on the first response of a query.
pub const DEFAULT_INITIAL_WAIT: Duration = Duration::from_secs(1);

/// Default period of "re-query" notifications for running operations.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the notification channel.
const NOTIFICATION_CAPACITY: usize = 256;

/// Engine timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a new query waits for its operation before answering.
    pub initial_wait: Duration,
    /// Period of the re-query notifications.
    pub notify_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_wait: DEFAULT_INITIAL_WAIT,
            notify_interval: DEFAULT_NOTIFY_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn with_initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval = interval;
        self
    }
}

// =============================================================================
// Operation
// =============================================================================

/// A slow computation producing result rows.
pub trait Operation: Send + Sync + 'static {
    /// Runs to completion on a blocking worker.
    ///
    /// Implementations poll `cancel` at every unit of work and return
    /// [`VfsError::Cancelled`](crate::vfs::VfsError::Cancelled) once it fires.
    fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>>;

    /// Snapshot reported while the operation is running.
    fn status(&self) -> QueryResult {
        QueryResult::pending()
    }
}

type ResultSlot = watch::Receiver<Option<QueryResult>>;

struct Holder {
    operation: Arc<dyn Operation>,
    result: ResultSlot,
    cancel: CancellationToken,
    notifier: Option<JoinHandle<()>>,
}

impl Drop for Holder {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.take() {
            notifier.abort();
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Registry of running operations keyed by request.
pub struct OperationEngine {
    config: EngineConfig,
    holders: Mutex<HashMap<String, Holder>>,
    notifications: broadcast::Sender<String>,
}

impl OperationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            config,
            holders: Mutex::new(HashMap::new()),
            notifications,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receiver of "re-query `key`" notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notifications.subscribe()
    }

    /// Runs or polls the operation registered under `key`.
    ///
    /// `factory` is only invoked when no operation for `key` is running.
    pub async fn query<F>(&self, key: &str, factory: F) -> QueryResult
    where
        F: FnOnce() -> Arc<dyn Operation>,
    {
        let (operation, result) = {
            let mut holders = self.holders.lock();
            if let Some(holder) = holders.get(key) {
                let finished = holder.result.borrow().clone();
                return match finished {
                    Some(result) => {
                        holders.remove(key);
                        debug!(key = %key, "Delivered final result");
                        result
                    }
                    None => holder.operation.status(),
                };
            }
            let operation = factory();
            let holder = self.start(key, Arc::clone(&operation));
            let result = holder.result.clone();
            holders.insert(key.to_string(), holder);
            (operation, result)
        };

        let mut waiter = result.clone();
        let finished = match tokio::time::timeout(
            self.config.initial_wait,
            waiter.wait_for(Option::is_some),
        )
        .await
        {
            Ok(Ok(slot)) => slot.clone(),
            Ok(Err(_)) => Some(QueryResult::Failed("operation aborted".to_string())),
            Err(_) => None,
        };

        match finished {
            Some(result_value) => {
                self.deregister(key, &result);
                result_value
            }
            None => {
                debug!(key = %key, wait = ?self.config.initial_wait, "Operation still running");
                self.start_notifier(key, &result);
                operation.status()
            }
        }
    }

    /// Cancels the operation registered under `key`.
    ///
    /// Returns false if nothing was running.
    pub fn cancel(&self, key: &str) -> bool {
        let Some(holder) = self.holders.lock().remove(key) else {
            return false;
        };
        holder.cancel.cancel();
        debug!(key = %key, "Cancelled operation");
        true
    }

    /// Cancels every running operation.
    pub fn cancel_all(&self) {
        let holders: Vec<_> = self.holders.lock().drain().collect();
        for (key, holder) in holders {
            holder.cancel.cancel();
            debug!(key = %key, "Cancelled operation");
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.holders.lock().contains_key(key)
    }

    pub fn holders_count(&self) -> usize {
        self.holders.lock().len()
    }

    fn start(&self, key: &str, operation: Arc<dyn Operation>) -> Holder {
        let cancel = CancellationToken::new();
        let (slot, result) = watch::channel(None);

        let task = {
            let operation = Arc::clone(&operation);
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || operation.call(&cancel))
        };
        let token = cancel.clone();
        let key_owned = key.to_string();
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(Ok(rows)) => QueryResult::Finished(rows),
                Ok(Err(e)) if e.is_cancelled() || token.is_cancelled() => QueryResult::Cancelled,
                Ok(Err(e)) => {
                    warn!(key = %key_owned, error = %e, "Operation failed");
                    QueryResult::Failed(e.to_string())
                }
                Err(e) if e.is_panic() => {
                    error!(key = %key_owned, "Operation panicked");
                    QueryResult::Failed("internal error: operation panicked".to_string())
                }
                Err(e) => QueryResult::Failed(e.to_string()),
            };
            // No receiver left means the holder was cancelled
            let _ = slot.send(Some(outcome));
        });

        debug!(key = %key, "Started operation");
        Holder {
            operation,
            result,
            cancel,
            notifier: None,
        }
    }

    /// Removes the holder of `key` if it is still the one owning `result`.
    fn deregister(&self, key: &str, result: &ResultSlot) {
        let mut holders = self.holders.lock();
        if holders
            .get(key)
            .is_some_and(|holder| holder.result.same_channel(result))
        {
            holders.remove(key);
        }
    }

    fn start_notifier(&self, key: &str, result: &ResultSlot) {
        let mut holders = self.holders.lock();
        let Some(holder) = holders.get_mut(key) else {
            return;
        };
        if !holder.result.same_channel(result) || holder.notifier.is_some() {
            return;
        }

        let notifications = self.notifications.clone();
        let interval = self.config.notify_interval;
        let result = result.clone();
        let key = key.to_string();
        holder.notifier = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let finished = result.borrow().is_some();
                // Nobody listening is fine; clients may poll on their own schedule
                let _ = notifications.send(key.clone());
                if finished {
                    break;
                }
            }
        }));
    }
}

impl Default for OperationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for OperationEngine {
    fn drop(&mut self) {
        for holder in self.holders.get_mut().values() {
            holder.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::VfsError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Operation blocking until released, then returning one row per call.
    struct Gate {
        released: AtomicBool,
        outcome: Mutex<Option<VfsResult<Vec<Row>>>>,
        cancelled: AtomicBool,
    }

    impl Gate {
        fn new(outcome: VfsResult<Vec<Row>>) -> Arc<Self> {
            Arc::new(Self {
                released: AtomicBool::new(false),
                outcome: Mutex::new(Some(outcome)),
                cancelled: AtomicBool::new(false),
            })
        }

        fn open(outcome: VfsResult<Vec<Row>>) -> Arc<Self> {
            let gate = Self::new(outcome);
            gate.release();
            gate
        }

        fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl Operation for Gate {
        fn call(&self, cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
            while !self.released.load(Ordering::SeqCst) {
                if cancel.is_cancelled() {
                    self.cancelled.store(true, Ordering::SeqCst);
                    return Err(VfsError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            self.outcome.lock().take().unwrap_or_else(|| Ok(vec![]))
        }

        fn status(&self) -> QueryResult {
            QueryResult::Progress { done: 1, total: 2 }
        }
    }

    struct Panics;

    impl Operation for Panics {
        fn call(&self, _cancel: &CancellationToken) -> VfsResult<Vec<Row>> {
            panic!("boom");
        }
    }

    fn engine() -> OperationEngine {
        OperationEngine::new(
            EngineConfig::default()
                .with_initial_wait(Duration::from_millis(30))
                .with_notify_interval(Duration::from_millis(10)),
        )
    }

    fn rows() -> Vec<Row> {
        vec![Row::EndOfResults]
    }

    async fn poll_until_terminal(
        engine: &OperationEngine,
        key: &str,
        gate: &Arc<Gate>,
    ) -> QueryResult {
        for _ in 0..500 {
            let result = engine
                .query(key, || Arc::clone(gate) as Arc<dyn Operation>)
                .await;
            if result.is_terminal() {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("operation never finished");
    }

    #[tokio::test]
    async fn test_fast_operation_returns_final_result() {
        let engine = OperationEngine::new(
            EngineConfig::default().with_initial_wait(Duration::from_secs(10)),
        );
        let gate = Gate::open(Ok(rows()));
        let result = engine.query("k", || gate.clone() as Arc<dyn Operation>).await;
        assert_eq!(result, QueryResult::Finished(rows()));
        assert_eq!(engine.holders_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_operation_reports_status_then_result() {
        let engine = engine();
        let gate = Gate::new(Ok(rows()));

        let first = engine.query("k", || gate.clone() as Arc<dyn Operation>).await;
        assert_eq!(first, QueryResult::Progress { done: 1, total: 2 });
        assert!(engine.is_registered("k"));

        gate.release();
        let last = poll_until_terminal(&engine, "k", &gate).await;
        assert_eq!(last, QueryResult::Finished(rows()));
        assert!(!engine.is_registered("k"));
    }

    #[tokio::test]
    async fn test_single_flight() {
        let engine = engine();
        let gate = Gate::new(Ok(rows()));
        let created = AtomicUsize::new(0);
        let factory = || {
            created.fetch_add(1, Ordering::SeqCst);
            gate.clone() as Arc<dyn Operation>
        };

        let results = futures::future::join_all((0..4).map(|_| engine.query("k", factory))).await;
        assert!(results.iter().all(|result| !result.is_terminal()));
        engine.query("k", factory).await;
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(engine.holders_count(), 1);

        gate.release();
        poll_until_terminal(&engine, "k", &gate).await;
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_reported_once() {
        let engine = engine();
        let gate = Gate::new(Err(VfsError::Parse("bad xml".to_string())));
        engine.query("k", || gate.clone() as Arc<dyn Operation>).await;
        gate.release();

        let result = poll_until_terminal(&engine, "k", &gate).await;
        assert_eq!(result, QueryResult::Failed("Parse error: bad xml".to_string()));
        assert!(!engine.is_registered("k"));
    }

    #[tokio::test]
    async fn test_cancel_deregisters_silently() {
        let engine = engine();
        let gate = Gate::new(Ok(rows()));
        engine.query("k", || gate.clone() as Arc<dyn Operation>).await;

        assert!(engine.cancel("k"));
        assert!(!engine.is_registered("k"));
        assert!(!engine.cancel("k"));

        for _ in 0..500 {
            if gate.cancelled.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(gate.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let engine = OperationEngine::new(
            EngineConfig::default().with_initial_wait(Duration::from_secs(10)),
        );
        let result = engine
            .query("k", || Arc::new(Panics) as Arc<dyn Operation>)
            .await;
        assert!(matches!(result, QueryResult::Failed(msg) if msg.contains("panicked")));
        assert_eq!(engine.holders_count(), 0);
    }

    #[tokio::test]
    async fn test_requery_notifications() {
        let engine = engine();
        let mut notifications = engine.subscribe();
        let gate = Gate::new(Ok(rows()));
        engine.query("slow", || gate.clone() as Arc<dyn Operation>).await;

        let key = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, "slow");
        gate.release();
    }
}
