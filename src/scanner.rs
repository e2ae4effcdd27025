//! One-shot startup discovery of shards matching the configured suffix.
//!
//! The scanner walks the cluster shard-map database once, front to back,
//! and asks the supervisor to resume a feed for every matching local
//! shard. Each request is scheduled on its own timer with a jitter delay
//! that widens as more shards queue up, so a node carrying thousands of
//! shards spreads its startup reads instead of opening every feed at once.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::SupervisorConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{ChangesRequest, FeedFrame, ShardStore};
use crate::supervisor::SupervisorMsg;
use crate::types::{name_suffix, Sequence, ShardName};

/// Walks the shard map and schedules a `ResumeScan` per matching local
/// shard, then exits. A non-normal exit here is fatal to the supervisor.
pub(crate) async fn run_scanner<S: ShardStore>(
    store: Arc<S>,
    config: SupervisorConfig,
    tx: mpsc::Sender<SupervisorMsg>,
) -> StoreResult<()> {
    info!(suffix = %config.suffix, shards_db = %config.shards_db, "scanner: starting discovery");

    // A local database named exactly like the suffix is followed as-is.
    // This is the system-database case: `_replicator` itself rather than a
    // shard of it.
    let system_db = ShardName::from_string(config.suffix.clone());
    if store.db_exists(&system_db).await {
        let _ = tx
            .send(SupervisorMsg::ResumeScan { shard: system_db })
            .await;
    }

    let shards_db = ShardName::from_string(config.shards_db.clone());
    let req = ChangesRequest {
        since: Sequence::ZERO,
        include_docs: false,
    };
    let mut feed = store.changes(&shards_db, req).await?;
    let mut jitter = ScanJitter::new(config.scan_avg_delay, config.scan_max_delay);
    let mut scheduled = 0usize;

    loop {
        match feed.next().await? {
            FeedFrame::Change(row) => {
                if row.is_design_doc() || row.deleted {
                    continue;
                }
                if name_suffix(&row.id) != config.suffix {
                    continue;
                }
                let shards = match store.local_shards(&row.id).await {
                    Ok(shards) => shards,
                    // Deleted between the shard-map row and now.
                    Err(StoreError::DatabaseDoesNotExist(_)) => Vec::new(),
                    Err(e) => return Err(e),
                };
                for shard in shards {
                    let delay = jitter.next_delay();
                    let delay_ms = delay.as_millis() as u64;
                    let tx = tx.clone();
                    scheduled += 1;
                    debug!(shard = %shard, delay_ms, "scanner: scheduling resume");
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(SupervisorMsg::ResumeScan { shard }).await;
                    });
                }
            }
            FeedFrame::Stop(_) => break,
            FeedFrame::Other => {}
        }
    }

    info!(scheduled, "scanner: discovery complete");
    Ok(())
}

/// Delay generator for scheduled resume scans.
///
/// The window is `uniform(1, min(2 * n * avg, max))` milliseconds, where
/// `n` counts scans scheduled so far, starting at 1.
struct ScanJitter {
    avg_ms: u64,
    max_ms: u64,
    n: u64,
}

impl ScanJitter {
    fn new(avg: Duration, max: Duration) -> Self {
        Self {
            avg_ms: avg.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            n: 1,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let cap = (2 * self.n * self.avg_ms).min(self.max_ms).max(1);
        self.n += 1;
        Duration::from_millis(rand::thread_rng().gen_range(1..=cap))
    }
}
