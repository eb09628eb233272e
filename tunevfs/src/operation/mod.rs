//! Asynchronous query operations.
//!
//! Slow VFS work (remote listings, deep searches, downloads) runs on
//! blocking workers behind the [`OperationEngine`]. Callers get a bounded
//! first response and poll for the rest:
//!
//! - [`QueryResult::Finished`] / [`QueryResult::Failed`] /
//!   [`QueryResult::Cancelled`] are terminal and delivered exactly once
//! - [`QueryResult::Progress`] and [`QueryResult::Partial`] mean "ask again"
//!
//! Running operations also publish the key of their query on
//! [`OperationEngine::subscribe`] so that clients know when to re-query.

mod engine;
mod progress;
mod result;

pub use engine::{
    EngineConfig, Operation, OperationEngine, DEFAULT_INITIAL_WAIT, DEFAULT_NOTIFY_INTERVAL,
};
pub use progress::{check_cancelled, ProgressCell, ProgressForwarder};
pub use result::{QueryResult, Row};
