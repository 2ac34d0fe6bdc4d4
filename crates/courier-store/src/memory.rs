//! In-process, in-memory store backend.
//!
//! A single task owns the document tree and the watcher list, so commands
//! are applied in arrival order and every atomic update is linearizable
//! without locks. After each mutation the affected watchers receive a fresh
//! snapshot of their query; a batch produces one snapshot per watcher, not
//! one per write.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use courier_shared::time::now_millis;

use crate::document::Fields;
use crate::handle::{BatchWrite, Snapshot, StoreCommand, StoreHandle, SubscriptionId};
use crate::ops;
use crate::paths::DocPath;
use crate::query::Query;

const COMMAND_BUFFER: usize = 64;

struct Watcher {
    id: SubscriptionId,
    query: Query,
    tx: mpsc::UnboundedSender<Snapshot>,
}

struct MemoryStore {
    docs: BTreeMap<DocPath, Fields>,
    watchers: Vec<Watcher>,
    next_subscription: u64,
}

/// Spawn the in-memory backend and return a handle to it. The task exits
/// when every handle has been dropped.
pub fn spawn_memory_store() -> StoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    tokio::spawn(run(cmd_rx));
    StoreHandle::new(cmd_tx)
}

async fn run(mut cmd_rx: mpsc::Receiver<StoreCommand>) {
    let mut store = MemoryStore {
        docs: BTreeMap::new(),
        watchers: Vec::new(),
        next_subscription: 0,
    };
    while let Some(cmd) = cmd_rx.recv().await {
        store.handle(cmd);
    }
    debug!("memory store task stopped");
}

impl MemoryStore {
    fn handle(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::Write {
                path,
                fields,
                reply,
            } => {
                trace!(path = %path, "write");
                self.docs.insert(path.clone(), fields);
                let _ = reply.send(Ok(()));
                self.notify(std::slice::from_ref(&path));
            }
            StoreCommand::Update { path, ops, reply } => {
                trace!(path = %path, ops = ops.len(), "update");
                let now = now_millis();
                let fields = self.docs.entry(path.clone()).or_default();
                for op in &ops {
                    ops::apply(fields, op, now);
                }
                let _ = reply.send(Ok(()));
                self.notify(std::slice::from_ref(&path));
            }
            StoreCommand::Batch { writes, reply } => {
                trace!(writes = writes.len(), "batch");
                let now = now_millis();
                let mut touched = Vec::with_capacity(writes.len());
                for write in writes {
                    match write {
                        BatchWrite::Update { path, ops } => {
                            let fields = self.docs.entry(path.clone()).or_default();
                            for op in &ops {
                                ops::apply(fields, op, now);
                            }
                            touched.push(path);
                        }
                        BatchWrite::Delete { path } => {
                            self.docs.remove(&path);
                            touched.push(path);
                        }
                    }
                }
                let _ = reply.send(Ok(()));
                self.notify(&touched);
            }
            StoreCommand::Delete { path, reply } => {
                trace!(path = %path, "delete");
                // Deleting a missing document is a no-op: the caller may be
                // acting on state a concurrent deleter already removed.
                self.docs.remove(&path);
                let _ = reply.send(Ok(()));
                self.notify(std::slice::from_ref(&path));
            }
            StoreCommand::Subscribe {
                query,
                snapshot_tx,
                reply,
            } => {
                let id = SubscriptionId(self.next_subscription);
                self.next_subscription += 1;
                let initial = query.evaluate(self.docs.iter());
                let _ = reply.send(Ok(id));
                let _ = snapshot_tx.send(initial);
                self.watchers.push(Watcher {
                    id,
                    query,
                    tx: snapshot_tx,
                });
                debug!(id = id.0, watchers = self.watchers.len(), "subscribed");
            }
            StoreCommand::Unsubscribe(id) => {
                self.watchers.retain(|w| w.id != id);
                debug!(id = id.0, watchers = self.watchers.len(), "unsubscribed");
            }
        }
    }

    fn notify(&mut self, touched: &[DocPath]) {
        let docs = &self.docs;
        let mut pruned = 0usize;
        self.watchers.retain(|watcher| {
            if !touched.iter().any(|path| watcher.query.watches(path)) {
                return true;
            }
            let snapshot = watcher.query.evaluate(docs.iter());
            if watcher.tx.send(snapshot).is_ok() {
                true
            } else {
                pruned += 1;
                false
            }
        });
        if pruned > 0 {
            trace!(pruned, "dropped watchers with closed receivers");
        }
    }
}
