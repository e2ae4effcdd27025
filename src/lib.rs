//! # Erwin
//!
//! A multi-shard change-feed fan-out supervisor for sharded document
//! stores. Erwin watches every local database shard whose name ends with
//! a configured suffix, keeps one change reader per shard, and surfaces
//! four kinds of events to a caller-supplied handler: *found*, *created*,
//! *deleted*, and *change*.
//!
//! # Core Invariants
//!
//! 1. **Single owner**: all checkpoint state lives inside one task and is
//!    mutated only while handling one message
//! 2. **Ack-gated**: readers block until the supervisor acknowledges each
//!    row; synchronous hand-off is the only backpressure
//! 3. **Per-shard order**: rows reach the handler in feed order; across
//!    shards there is no ordering guarantee
//! 4. **Crash containment**: a reader failure is logged and reconciled,
//!    never fatal; infrastructure failures stop the supervisor
//!
//! # Architecture
//!
//! ```text
//!  Shard map ──▶ Scanner ──┐                     ┌──▶ Reader (shard A)
//!                          ├──▶ Supervisor ◀─────┤
//!  Event Bus ──────────────┘    (checkpoints)    └──▶ Reader (shard B)
//!                                     │
//!                                     ▼
//!                               ChangeHandler
//! ```
//!
//! Checkpoints are in-memory: a restarted supervisor rediscovers its
//! shards and replays each feed from the beginning.

pub mod config;
pub mod error;
pub mod handler;
mod reader;
mod scanner;
pub mod store;
pub mod supervisor;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::SupervisorConfig;
pub use error::{StoreError, StoreResult, SupervisorError};
pub use handler::{ChangeHandler, HandlerCall, NullHandler, RecordingHandler};
pub use store::{ChangeFeed, ChangesRequest, FeedFrame, ShardStore};
pub use supervisor::{CheckpointEntry, Supervisor, SupervisorHandle, SupervisorSnapshot};
pub use types::{
    name_suffix, ChangeRow, DbEvent, DbEventKind, ExitReason, Sequence, ShardName, TaskId,
    DESIGN_DOC_PREFIX,
};
