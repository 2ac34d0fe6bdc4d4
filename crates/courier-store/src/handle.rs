//! Async capability interface to the remote store.
//!
//! Callers hold a cloneable [`StoreHandle`] whose methods send typed
//! commands into the store task and await oneshot replies; subscriptions
//! deliver snapshots over their own channels. The backend behind the
//! command channel is opaque to callers: the in-memory backend in
//! [`crate::memory`] and a production wire client are interchangeable.

use tokio::sync::{mpsc, oneshot};

use crate::document::{Document, Fields};
use crate::error::{Result, StoreError};
use crate::ops::FieldOp;
use crate::paths::DocPath;
use crate::query::Query;

/// Full result set of a subscribed query, delivered on every change.
pub type Snapshot = Vec<Document>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// One write in an atomic batch.
#[derive(Debug)]
pub enum BatchWrite {
    Update { path: DocPath, ops: Vec<FieldOp> },
    Delete { path: DocPath },
}

/// Commands sent *into* the store task.
#[derive(Debug)]
pub enum StoreCommand {
    /// Create or overwrite a whole document.
    Write {
        path: DocPath,
        fields: Fields,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Atomic field operations; creates the document if absent.
    Update {
        path: DocPath,
        ops: Vec<FieldOp>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Several updates/deletes committed together.
    Batch {
        writes: Vec<BatchWrite>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Remove a document. Deleting a missing document is a no-op.
    Delete {
        path: DocPath,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        query: Query,
        snapshot_tx: mpsc::UnboundedSender<Snapshot>,
        reply: oneshot::Sender<Result<SubscriptionId>>,
    },
    Unsubscribe(SubscriptionId),
}

/// Cloneable handle for issuing store operations.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    cmd_tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(cmd_tx: mpsc::Sender<StoreCommand>) -> Self {
        Self { cmd_tx }
    }

    pub async fn write(&self, path: DocPath, fields: Fields) -> Result<()> {
        self.roundtrip(|reply| StoreCommand::Write { path, fields, reply })
            .await
    }

    pub async fn update(&self, path: DocPath, ops: Vec<FieldOp>) -> Result<()> {
        self.roundtrip(|reply| StoreCommand::Update { path, ops, reply })
            .await
    }

    pub async fn batch(&self, writes: Vec<BatchWrite>) -> Result<()> {
        self.roundtrip(|reply| StoreCommand::Batch { writes, reply })
            .await
    }

    pub async fn delete(&self, path: DocPath) -> Result<()> {
        self.roundtrip(|reply| StoreCommand::Delete { path, reply })
            .await
    }

    /// Subscribe to a query. The full current result set is delivered
    /// immediately, then again on every matching change.
    pub async fn subscribe(&self, query: Query) -> Result<Subscription> {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let id = self
            .roundtrip(|reply| StoreCommand::Subscribe {
                query,
                snapshot_tx,
                reply,
            })
            .await?;
        Ok(Subscription {
            id,
            rx: snapshot_rx,
            cmd_tx: self.cmd_tx.clone(),
            cancelled: false,
        })
    }

    async fn roundtrip<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }
}

/// A live subscription. Cancel explicitly with [`Subscription::cancel`];
/// dropping performs a best-effort unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Snapshot>,
    cmd_tx: mpsc::Sender<StoreCommand>,
    cancelled: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next snapshot, or `None` once the subscription is torn down.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    pub async fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            let _ = self.cmd_tx.send(StoreCommand::Unsubscribe(self.id)).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.cancelled {
            // The store also prunes watchers whose receiver is gone, so a
            // full command queue here is harmless.
            let _ = self.cmd_tx.try_send(StoreCommand::Unsubscribe(self.id));
        }
    }
}
