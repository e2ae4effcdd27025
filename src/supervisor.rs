//! The fan-out supervisor.
//!
//! One supervisor follows every local shard whose name matches a suffix.
//! It owns the checkpoint table and the worker set, and it is the single
//! serialization point: readers, the scanner, and the event bus all feed
//! into one inbox, and every mutation happens while handling one message.
//!
//! # Architecture
//!
//! ```text
//!  Event Bus ────┐                          ┌──▶ Change Reader (shard A)
//!                ├──▶ Supervisor loop ◀─────┤
//!  Scanner ──────┘    (checkpoint table)    └──▶ Change Reader (shard B)
//!                            │
//!                            ▼
//!                     ChangeHandler
//! ```
//!
//! # Core Invariants
//!
//! 1. **Single owner**: the checkpoint table and workers map are mutated
//!    only inside the supervisor loop
//! 2. **Ack-gated**: a reader blocks until its row is acknowledged; there
//!    is no buffering between a reader and the handler
//! 3. **Worker correspondence**: a checkpoint entry carries a worker id
//!    iff that reader is alive and registered for the same shard
//! 4. **Monotone sequences**: a shard's checkpointed sequence never moves
//!    backwards
//!
//! Reader failures are contained; scanner failure, event-bus death, and
//! unknown task exits are fatal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{StoreResult, SupervisorError};
use crate::handler::ChangeHandler;
use crate::reader::run_reader;
use crate::scanner::run_scanner;
use crate::store::ShardStore;
use crate::types::{ChangeRow, DbEvent, DbEventKind, ExitReason, Sequence, ShardName, TaskId};

/// Bound of the supervisor inbox.
const INBOX_BOUND: usize = 64;

/// One row of the checkpoint table.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointEntry {
    /// Shard this entry tracks.
    pub shard: ShardName,
    /// Last sequence a reader checkpointed for this shard.
    pub end_seq: Sequence,
    /// A rescan was requested while a reader was running; a fresh reader
    /// starts from `end_seq` once the current one exits.
    pub rescan_pending: bool,
    /// The reader currently following this shard, if any.
    pub worker: Option<TaskId>,
}

/// Point-in-time view of supervisor state.
#[derive(Debug, Clone)]
pub struct SupervisorSnapshot {
    /// All checkpoint entries, in no particular order.
    pub checkpoints: Vec<CheckpointEntry>,
    /// Number of live change readers.
    pub worker_count: usize,
    /// Whether the startup scanner is still running.
    pub scanner_running: bool,
}

impl SupervisorSnapshot {
    /// Returns the checkpoint entry for one shard.
    pub fn checkpoint(&self, shard: &ShardName) -> Option<&CheckpointEntry> {
        self.checkpoints.iter().find(|e| &e.shard == shard)
    }
}

/// Messages handled by the supervisor loop.
pub(crate) enum SupervisorMsg {
    /// A reader delivered one change row; it blocks until `ack`.
    Change {
        shard: ShardName,
        row: ChangeRow,
        ack: oneshot::Sender<()>,
    },
    /// A reader finished its feed at `seq`; it blocks until `ack`.
    Checkpoint {
        shard: ShardName,
        worker: TaskId,
        seq: Sequence,
        ack: oneshot::Sender<()>,
    },
    /// Start, restart, or coalesce a feed for `shard`.
    ResumeScan { shard: ShardName },
    /// A monitored task terminated.
    TaskExited { id: TaskId, reason: ExitReason },
    /// Request a state snapshot.
    Inspect {
        reply: oneshot::Sender<SupervisorSnapshot>,
    },
    /// Stop the supervisor and every task it owns.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to a running supervisor.
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMsg>,
    task: JoinHandle<Result<(), SupervisorError>>,
}

impl SupervisorHandle {
    /// Requests that a shard's feed be started, restarted, or coalesced
    /// into the currently-running reader.
    pub async fn resume_scan(&self, shard: ShardName) {
        let _ = self.tx.send(SupervisorMsg::ResumeScan { shard }).await;
    }

    /// Returns a snapshot of the checkpoint table and task state, or
    /// `None` if the supervisor has stopped.
    pub async fn inspect(&self) -> Option<SupervisorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SupervisorMsg::Inspect { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Stops the supervisor and all of its tasks, then reports how it
    /// exited. A supervisor that already crashed yields its crash reason.
    pub async fn shutdown(self) -> Result<(), SupervisorError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SupervisorMsg::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
        self.join().await
    }

    /// Waits for the supervisor to terminate and returns its exit result.
    pub async fn join(self) -> Result<(), SupervisorError> {
        self.task.await.expect("supervisor task panicked")
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> mpsc::Sender<SupervisorMsg> {
        self.tx.clone()
    }
}

struct Worker {
    shard: ShardName,
    abort: AbortHandle,
}

struct ScannerTask {
    id: TaskId,
    abort: AbortHandle,
}

/// The supervisor actor.
///
/// Constructed and run via [`Supervisor::spawn`]; all interaction goes
/// through the returned [`SupervisorHandle`] and the supervised tasks.
pub struct Supervisor<S: ShardStore, H: ChangeHandler> {
    store: Arc<S>,
    config: SupervisorConfig,
    handler: H,
    context: Option<H::Context>,
    checkpoints: HashMap<ShardName, CheckpointEntry>,
    workers: HashMap<TaskId, Worker>,
    scanner: Option<ScannerTask>,
    tx: mpsc::Sender<SupervisorMsg>,
}

impl<S: ShardStore, H: ChangeHandler> Supervisor<S, H> {
    /// Starts a supervisor for every local shard whose suffix matches
    /// `config.suffix`.
    ///
    /// Subscribes to the store's event bus, then spawns the startup
    /// scanner. The handler runs inside the supervisor loop and threads
    /// `context` through every callback.
    pub fn spawn(store: S, config: SupervisorConfig, handler: H, context: H::Context) -> SupervisorHandle {
        let store = Arc::new(store);
        let (tx, rx) = mpsc::channel(INBOX_BOUND);

        // Subscribe before the scanner runs so no event can fall between
        // discovery and the live stream.
        let events = store.subscribe();

        let mut supervisor = Supervisor {
            store,
            config,
            handler,
            context: Some(context),
            checkpoints: HashMap::new(),
            workers: HashMap::new(),
            scanner: None,
            tx: tx.clone(),
        };
        supervisor.spawn_scanner();

        let task = tokio::spawn(supervisor.run(rx, events));
        SupervisorHandle { tx, task }
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<SupervisorMsg>,
        mut events: broadcast::Receiver<DbEvent>,
    ) -> Result<(), SupervisorError> {
        info!(suffix = %self.config.suffix, "supervisor: started");

        let result = loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(SupervisorMsg::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break Ok(());
                    }
                    Some(msg) => {
                        if let Err(e) = self.handle_msg(msg) {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "supervisor: event bus lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break Err(SupervisorError::EventBusDied);
                    }
                },
            }
        };

        self.stop_tasks();
        match &result {
            Ok(()) => info!(suffix = %self.config.suffix, "supervisor: stopped"),
            Err(e) => error!(suffix = %self.config.suffix, error = %e, "supervisor: terminating"),
        }
        result
    }

    fn handle_msg(&mut self, msg: SupervisorMsg) -> Result<(), SupervisorError> {
        match msg {
            SupervisorMsg::Change { shard, row, ack } => {
                self.handle_change(&shard, &row);
                let _ = ack.send(());
                Ok(())
            }
            SupervisorMsg::Checkpoint {
                shard,
                worker,
                seq,
                ack,
            } => {
                self.handle_checkpoint(&shard, worker, seq);
                let _ = ack.send(());
                Ok(())
            }
            SupervisorMsg::ResumeScan { shard } => {
                self.resume_scan(shard);
                Ok(())
            }
            SupervisorMsg::TaskExited { id, reason } => self.handle_task_exited(id, reason),
            SupervisorMsg::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
            // Matched in the run loop.
            SupervisorMsg::Shutdown { reply } => {
                let _ = reply.send(());
                Ok(())
            }
        }
    }

    /// Runs one callback, replacing the stored context with its return.
    fn with_context(&mut self, f: impl FnOnce(&H, H::Context) -> H::Context) {
        if let Some(ctx) = self.context.take() {
            self.context = Some(f(&self.handler, ctx));
        }
    }

    fn handle_change(&mut self, shard: &ShardName, row: &ChangeRow) {
        if self.config.skip_design_docs && row.is_design_doc() {
            debug!(shard = %shard, doc = %row.id, "supervisor: dropping design document change");
            return;
        }
        if !self.checkpoints.contains_key(shard) {
            debug!(shard = %shard, doc = %row.id, "supervisor: dropping change for unknown shard");
            return;
        }
        self.with_context(|handler, ctx| handler.db_change(shard, row, ctx));
    }

    /// Rewrites a shard's checkpointed sequence iff the reporting worker
    /// still owns the entry. Anything else is a stale report from a
    /// superseded reader and is dropped.
    fn handle_checkpoint(&mut self, shard: &ShardName, worker: TaskId, seq: Sequence) {
        match self.checkpoints.get_mut(shard) {
            Some(entry) if entry.worker == Some(worker) => {
                debug!(shard = %shard, end_seq = %seq, "supervisor: checkpoint");
                entry.end_seq = seq;
            }
            _ => {
                debug!(shard = %shard, worker = %worker, end_seq = %seq, "supervisor: ignoring stale checkpoint");
            }
        }
    }

    /// The resume-scan state machine: start a first reader, restart an
    /// idle shard from its checkpoint, or coalesce onto a live reader.
    fn resume_scan(&mut self, shard: ShardName) {
        let current = self.checkpoints.get(&shard).map(|e| (e.end_seq, e.worker));
        match current {
            None => {
                let worker = self.spawn_reader(shard.clone(), Sequence::ZERO);
                self.checkpoints.insert(
                    shard.clone(),
                    CheckpointEntry {
                        shard: shard.clone(),
                        end_seq: Sequence::ZERO,
                        rescan_pending: false,
                        worker: Some(worker),
                    },
                );
                self.with_context(|handler, ctx| handler.db_found(&shard, ctx));
            }
            Some((end_seq, None)) => {
                let worker = self.spawn_reader(shard.clone(), end_seq);
                if let Some(entry) = self.checkpoints.get_mut(&shard) {
                    entry.rescan_pending = false;
                    entry.worker = Some(worker);
                }
            }
            Some((_, Some(_))) => {
                // The running reader will be relaunched from its final
                // checkpoint when it exits.
                if let Some(entry) = self.checkpoints.get_mut(&shard) {
                    entry.rescan_pending = true;
                }
            }
        }
    }

    fn handle_event(&mut self, event: DbEvent) {
        if event.name.suffix() != self.config.suffix {
            return;
        }
        match event.kind {
            DbEventKind::Created => {
                debug!(shard = %event.name, "supervisor: database created");
                self.with_context(|handler, ctx| handler.db_created(&event.name, ctx));
                self.resume_scan(event.name);
            }
            DbEventKind::Deleted => {
                // Workers and the checkpoint entry are left alone; the
                // reader's own death cleans up.
                debug!(shard = %event.name, "supervisor: database deleted");
                self.with_context(|handler, ctx| handler.db_deleted(&event.name, ctx));
            }
            DbEventKind::Updated => {
                self.resume_scan(event.name);
            }
            _ => {}
        }
    }

    fn handle_task_exited(&mut self, id: TaskId, reason: ExitReason) -> Result<(), SupervisorError> {
        if self.scanner.as_ref().is_some_and(|s| s.id == id) {
            self.scanner = None;
            return if reason.is_normal() {
                debug!("supervisor: scanner finished");
                Ok(())
            } else {
                Err(SupervisorError::ScannerDied { reason })
            };
        }

        if let Some(worker) = self.workers.remove(&id) {
            if !reason.is_normal() {
                error!(shard = %worker.shard, worker = %id, reason = %reason, "supervisor: change reader failed");
            }
            let mut rescan = false;
            if let Some(entry) = self.checkpoints.get_mut(&worker.shard) {
                if entry.worker == Some(id) {
                    entry.worker = None;
                    rescan = entry.rescan_pending;
                }
            }
            if rescan {
                self.resume_scan(worker.shard);
            }
            return Ok(());
        }

        Err(SupervisorError::UnexpectedExit {
            task_id: id,
            reason,
        })
    }

    fn spawn_reader(&mut self, shard: ShardName, since: Sequence) -> TaskId {
        let id = TaskId::new();
        debug!(shard = %shard, since = %since, worker = %id, "supervisor: spawning change reader");
        let fut = run_reader(
            id,
            shard.clone(),
            since,
            Arc::clone(&self.store),
            self.tx.clone(),
        );
        let abort = self.spawn_monitored(id, fut);
        self.workers.insert(id, Worker { shard, abort });
        id
    }

    fn spawn_scanner(&mut self) {
        let id = TaskId::new();
        let fut = run_scanner(Arc::clone(&self.store), self.config.clone(), self.tx.clone());
        let abort = self.spawn_monitored(id, fut);
        self.scanner = Some(ScannerTask { id, abort });
    }

    /// Spawns a task and a monitor that reports its termination into the
    /// supervisor inbox, normal or not. Panics surface as abnormal exits.
    fn spawn_monitored<F>(&self, id: TaskId, fut: F) -> AbortHandle
    where
        F: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let abort = handle.abort_handle();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let reason = match handle.await {
                Ok(Ok(())) => ExitReason::Normal,
                Ok(Err(e)) => ExitReason::Failed(e.to_string()),
                Err(e) => ExitReason::Panicked(e.to_string()),
            };
            let _ = tx.send(SupervisorMsg::TaskExited { id, reason }).await;
        });
        abort
    }

    fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            checkpoints: self.checkpoints.values().cloned().collect(),
            worker_count: self.workers.len(),
            scanner_running: self.scanner.is_some(),
        }
    }

    fn stop_tasks(&mut self) {
        if let Some(scanner) = self.scanner.take() {
            scanner.abort.abort();
        }
        for (_, worker) in self.workers.drain() {
            worker.abort.abort();
        }
    }
}
