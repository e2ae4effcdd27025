//! The document-store contract.
//!
//! Erwin does not own a document store. It consumes one through this seam:
//! a change-feed primitive per database, a shard-map lookup, and the
//! cluster event bus. Implementations are expected to open databases in
//! the admin context, since the shards followed here include system
//! databases the calling user may not own.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreResult;
use crate::types::{ChangeRow, DbEvent, Sequence, ShardName};

/// Parameters for opening a change feed.
///
/// Feeds opened through this contract are always "normal" mode: they
/// stream the current backlog and then emit [`FeedFrame::Stop`]. There is
/// no per-operation timeout; feed IO blocks indefinitely and failure is
/// signalled through the returned error.
#[derive(Debug, Clone, Copy)]
pub struct ChangesRequest {
    /// Sequence to resume from; [`Sequence::ZERO`] replays from the
    /// beginning.
    pub since: Sequence,
    /// Attach document bodies to change rows.
    pub include_docs: bool,
}

/// One frame of a change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    /// A document changed.
    Change(ChangeRow),
    /// The feed reached the end of its backlog at the given sequence.
    Stop(Sequence),
    /// Anything else the feed emits. Consumers ignore these.
    Other,
}

/// A finite change feed over one database.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Returns the next frame. After [`FeedFrame::Stop`] the feed is
    /// exhausted and must not be polled again.
    async fn next(&mut self) -> StoreResult<FeedFrame>;
}

/// Contract the sharded document store must provide.
#[async_trait]
pub trait ShardStore: Send + Sync + 'static {
    /// Whether a local database with this exact name exists.
    async fn db_exists(&self, name: &ShardName) -> bool;

    /// The shards of `db_name` hosted on this node.
    ///
    /// Returns [`StoreError::DatabaseDoesNotExist`] when the database is
    /// gone; callers treat that as the empty list.
    ///
    /// [`StoreError::DatabaseDoesNotExist`]: crate::error::StoreError::DatabaseDoesNotExist
    async fn local_shards(&self, db_name: &str) -> StoreResult<Vec<ShardName>>;

    /// Opens a finite change feed on one database.
    async fn changes(
        &self,
        name: &ShardName,
        req: ChangesRequest,
    ) -> StoreResult<Box<dyn ChangeFeed>>;

    /// Subscribes to cluster database lifecycle events.
    ///
    /// Closure of the channel means the event bus itself died, which is
    /// fatal to any supervisor consuming it.
    fn subscribe(&self) -> broadcast::Receiver<DbEvent>;
}
