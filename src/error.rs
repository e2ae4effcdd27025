//! Error types for erwin.

use thiserror::Error;

use crate::types::{ExitReason, TaskId};

/// Errors surfaced by the document-store contract.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named database is not present on this node.
    #[error("database does not exist: {0}")]
    DatabaseDoesNotExist(String),

    /// A change feed failed mid-stream or could not be opened.
    #[error("change feed error: {0}")]
    Feed(String),

    /// IO error from the underlying store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Terminal supervisor failures.
///
/// A running supervisor either serves indefinitely or exits with one of
/// these reasons. Per-shard reader failures are not terminal; they are
/// logged and reconciled against the checkpoint table.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The cluster event bus went away; shard lifecycle can no longer be
    /// observed.
    #[error("event bus died")]
    EventBusDied,

    /// The startup scanner failed before completing discovery.
    #[error("scanner died: {reason}")]
    ScannerDied { reason: ExitReason },

    /// A task the supervisor does not own reported termination.
    #[error("unexpected exit of task {task_id}: {reason}")]
    UnexpectedExit { task_id: TaskId, reason: ExitReason },
}
