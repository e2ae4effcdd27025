//! The user callback contract.
//!
//! The supervisor surfaces four kinds of events to a handler: a shard was
//! found by the startup scan, created, deleted, or produced a change row.
//! Each callback receives the caller's context value and returns the next
//! one; the supervisor stores whatever comes back.
//!
//! # Design Principles
//!
//! - The supervisor observes; the handler decides what events mean
//! - Context is threaded, never shared: every callback returns the value
//!   the next callback will receive
//! - Callbacks run inside the supervisor's serial loop. They must not call
//!   back into the supervisor: the reader that delivered the row is
//!   blocked until the callback returns, and so is everything else.

use std::sync::Mutex;

use crate::types::{ChangeRow, ShardName};

/// Receives shard lifecycle events and change rows from a supervisor.
///
/// All four operations default to returning the context unchanged, so
/// implementations override only the events they care about.
pub trait ChangeHandler: Send + 'static {
    /// Caller-owned state threaded through every callback.
    type Context: Send + 'static;

    /// A matching database was created on the cluster.
    fn db_created(&self, _shard: &ShardName, ctx: Self::Context) -> Self::Context {
        ctx
    }

    /// A matching database was deleted from the cluster.
    fn db_deleted(&self, _shard: &ShardName, ctx: Self::Context) -> Self::Context {
        ctx
    }

    /// A matching shard was discovered and its feed is being opened.
    fn db_found(&self, _shard: &ShardName, ctx: Self::Context) -> Self::Context {
        ctx
    }

    /// One change row from a followed shard, in feed order.
    fn db_change(&self, _shard: &ShardName, _row: &ChangeRow, ctx: Self::Context) -> Self::Context {
        ctx
    }
}

impl<H> ChangeHandler for std::sync::Arc<H>
where
    H: ChangeHandler + Sync,
{
    type Context = H::Context;

    fn db_created(&self, shard: &ShardName, ctx: Self::Context) -> Self::Context {
        (**self).db_created(shard, ctx)
    }

    fn db_deleted(&self, shard: &ShardName, ctx: Self::Context) -> Self::Context {
        (**self).db_deleted(shard, ctx)
    }

    fn db_found(&self, shard: &ShardName, ctx: Self::Context) -> Self::Context {
        (**self).db_found(shard, ctx)
    }

    fn db_change(&self, shard: &ShardName, row: &ChangeRow, ctx: Self::Context) -> Self::Context {
        (**self).db_change(shard, row, ctx)
    }
}

/// A handler that ignores every event.
#[derive(Debug, Default)]
pub struct NullHandler;

impl ChangeHandler for NullHandler {
    type Context = ();
}

/// One callback observed by a [`RecordingHandler`], with the context value
/// it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    Created { shard: ShardName, ctx: u32 },
    Deleted { shard: ShardName, ctx: u32 },
    Found { shard: ShardName, ctx: u32 },
    Change { shard: ShardName, doc_id: String, ctx: u32 },
}

/// A handler that records every callback for testing.
///
/// Its context is a counter: each callback records the value it received
/// and returns it incremented, which makes context threading visible in
/// assertions.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerCall>>,
}

impl RecordingHandler {
    /// Creates a new recording handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded callbacks.
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Clears all recorded callbacks.
    pub fn clear(&self) {
        self.calls.lock().expect("lock poisoned").clear();
    }

    /// Returns the number of recorded callbacks.
    pub fn len(&self) -> usize {
        self.calls.lock().expect("lock poisoned").len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, call: HandlerCall) {
        self.calls.lock().expect("lock poisoned").push(call);
    }
}

impl ChangeHandler for RecordingHandler {
    type Context = u32;

    fn db_created(&self, shard: &ShardName, ctx: u32) -> u32 {
        self.record(HandlerCall::Created {
            shard: shard.clone(),
            ctx,
        });
        ctx + 1
    }

    fn db_deleted(&self, shard: &ShardName, ctx: u32) -> u32 {
        self.record(HandlerCall::Deleted {
            shard: shard.clone(),
            ctx,
        });
        ctx + 1
    }

    fn db_found(&self, shard: &ShardName, ctx: u32) -> u32 {
        self.record(HandlerCall::Found {
            shard: shard.clone(),
            ctx,
        });
        ctx + 1
    }

    fn db_change(&self, shard: &ShardName, row: &ChangeRow, ctx: u32) -> u32 {
        self.record(HandlerCall::Change {
            shard: shard.clone(),
            doc_id: row.id.clone(),
            ctx,
        });
        ctx + 1
    }
}
