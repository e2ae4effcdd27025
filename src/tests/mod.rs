//! Integration tests for the erwin supervisor.
//!
//! Test organization:
//!
//! - `harness.rs`     - In-memory store, event bus, and wait helpers
//! - `discovery.rs`   - Startup scanner and resume-scan discovery
//! - `changes.rs`     - Change delivery, context threading, design-doc filter
//! - `checkpoints.rs` - Checkpoint updates, stale reports, rescan coalescing
//! - `events.rs`      - Cluster event handling and suffix filtering
//! - `lifecycle.rs`   - Task exits, crash containment, terminal failures
//! - `ordering.rs`    - Per-shard ordering and synchronous backpressure
//! - `invariants.rs`  - Cross-cutting supervisor invariants

mod ordering;

use std::sync::Arc;

use crate::config::SupervisorConfig;
use crate::handler::{HandlerCall, RecordingHandler};
use crate::supervisor::{Supervisor, SupervisorHandle};
use crate::types::ShardName;

use harness::{row, wait_for_calls, MemoryStore};

/// The shard and suffix most scenarios use.
pub(crate) const SHARD: &str = "shards/40000000-5fffffff/acct/suff.0123456789";
pub(crate) const SUFFIX: &str = "suff";

pub(crate) fn suff_config() -> SupervisorConfig {
    SupervisorConfig::new(SUFFIX)
}

/// Spawns a supervisor over a clone of `store` with a shared recording
/// handler and initial context `0`.
pub(crate) fn spawn_recording(
    store: &MemoryStore,
    config: SupervisorConfig,
) -> (SupervisorHandle, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::new());
    let handle = Supervisor::spawn(store.clone(), config, Arc::clone(&handler), 0);
    (handle, handler)
}

/// Basic workflow test demonstrating core functionality.
#[tokio::test]
async fn basic_workflow() {
    let store = MemoryStore::new();
    store.create_db_held(SHARD);
    let (handle, handler) = spawn_recording(&store, suff_config());

    let shard = ShardName::from(SHARD);
    handle.resume_scan(shard.clone()).await;
    wait_for_calls(&handler, 1).await;

    store.put(SHARD, row("doc1", 1));
    let calls = wait_for_calls(&handler, 2).await;

    assert_eq!(
        calls,
        vec![
            HandlerCall::Found {
                shard: shard.clone(),
                ctx: 0
            },
            HandlerCall::Change {
                shard: shard.clone(),
                doc_id: "doc1".to_string(),
                ctx: 1
            },
        ]
    );

    handle.shutdown().await.unwrap();
}
