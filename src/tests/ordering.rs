//! Ordering and backpressure tests.

use std::sync::Arc;
use std::time::Duration;

use crate::handler::HandlerCall;
use crate::supervisor::Supervisor;
use crate::types::ShardName;

use super::harness::{row, wait_for_calls, wait_until, GateHandler, MemoryStore};
use super::{spawn_recording, suff_config, SHARD};

#[tokio::test]
async fn rows_delivered_in_feed_order() {
    let store = MemoryStore::new();
    store.create_db(SHARD);
    for n in 1..=10 {
        store.put(SHARD, row(&format!("doc{}", n), n));
    }
    let (handle, handler) = spawn_recording(&store, suff_config());

    let shard = ShardName::from(SHARD);
    handle.resume_scan(shard.clone()).await;

    let calls = wait_for_calls(&handler, 11).await;
    assert_eq!(
        calls[0],
        HandlerCall::Found {
            shard: shard.clone(),
            ctx: 0
        }
    );
    for (i, call) in calls[1..].iter().enumerate() {
        assert_eq!(
            *call,
            HandlerCall::Change {
                shard: shard.clone(),
                doc_id: format!("doc{}", i + 1),
                ctx: (i + 1) as u32,
            }
        );
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn found_precedes_every_change() {
    let store = MemoryStore::new();
    store.create_db(SHARD);
    store.put(SHARD, row("doc1", 1));
    let (handle, handler) = spawn_recording(&store, suff_config());

    handle.resume_scan(ShardName::from(SHARD)).await;

    let calls = wait_for_calls(&handler, 2).await;
    assert!(matches!(calls[0], HandlerCall::Found { .. }));
    assert!(matches!(calls[1], HandlerCall::Change { .. }));

    handle.shutdown().await.unwrap();
}

/// A reader may not run ahead of callback processing: each row blocks
/// until the supervisor acknowledges it, and the supervisor acknowledges
/// only after the handler returns.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reader_blocks_until_change_is_acknowledged() {
    let store = MemoryStore::new();
    store.create_db(SHARD);
    for n in 1..=3 {
        store.put(SHARD, row(&format!("doc{}", n), n));
    }

    let (gate, permits) = GateHandler::new();
    let gate = Arc::new(gate);
    let handle = Supervisor::spawn(store.clone(), suff_config(), Arc::clone(&gate), 0);

    handle.resume_scan(ShardName::from(SHARD)).await;

    // The handler is sitting inside db_change for doc1; the reader is
    // blocked on its ack and must not have delivered doc2.
    wait_until(|| gate.calls().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gate.calls().len(), 2);

    permits.send(()).unwrap();
    wait_until(|| gate.calls().len() == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gate.calls().len(), 3);

    permits.send(()).unwrap();
    permits.send(()).unwrap();
    wait_until(|| gate.calls().len() == 4).await;

    handle.shutdown().await.unwrap();
}
