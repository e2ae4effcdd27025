//! The per-shard change reader.
//!
//! One reader follows one shard: it opens a finite change feed from a
//! given sequence and hands every row to the supervisor synchronously.
//! The reader never touches the checkpoint table; it only reports, and it
//! blocks on each report until the supervisor acknowledges it. That
//! hand-off is the system's only backpressure.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::StoreResult;
use crate::store::{ChangesRequest, FeedFrame, ShardStore};
use crate::supervisor::SupervisorMsg;
use crate::types::{Sequence, ShardName, TaskId};

/// Streams one shard's backlog into the supervisor, then checkpoints and
/// returns. A send failure means the supervisor is gone; that is a normal
/// exit, not an error.
pub(crate) async fn run_reader<S: ShardStore>(
    task_id: TaskId,
    shard: ShardName,
    since: Sequence,
    store: Arc<S>,
    tx: mpsc::Sender<SupervisorMsg>,
) -> StoreResult<()> {
    debug!(worker = %task_id, shard = %shard, since = %since, "reader: opening change feed");

    let req = ChangesRequest {
        since,
        include_docs: true,
    };
    let mut feed = store.changes(&shard, req).await?;

    loop {
        match feed.next().await? {
            FeedFrame::Change(row) => {
                let (ack, acked) = oneshot::channel();
                let msg = SupervisorMsg::Change {
                    shard: shard.clone(),
                    row,
                    ack,
                };
                if tx.send(msg).await.is_err() || acked.await.is_err() {
                    return Ok(());
                }
            }
            FeedFrame::Stop(end_seq) => {
                let (ack, acked) = oneshot::channel();
                let msg = SupervisorMsg::Checkpoint {
                    shard: shard.clone(),
                    worker: task_id,
                    seq: end_seq,
                    ack,
                };
                if tx.send(msg).await.is_ok() {
                    let _ = acked.await;
                }
                debug!(worker = %task_id, shard = %shard, end_seq = %end_seq, "reader: feed ended");
                return Ok(());
            }
            FeedFrame::Other => {}
        }
    }
}
