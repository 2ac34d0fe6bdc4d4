//! Read receipts: when the active conversation's message set changes, mark
//! every unread peer message read in one atomic batch.
//!
//! Rapid successive snapshot deliveries coalesce: a scan landing inside the
//! window defers one batch to the window's end instead of issuing another
//! immediately. A failed batch is logged and not retried within the cycle;
//! the next snapshot naturally re-detects the same unread set.

use std::time::Instant;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_shared::types::{ConversationId, MessageId, MessageStatus, UserId};
use courier_store::{BatchWrite, DocPath, FieldOp, FieldPath, Message, StoreHandle};

use crate::config::SyncConfig;

pub struct ReadReceiptBatcher {
    store: StoreHandle,
    user: UserId,
    coalesce: std::time::Duration,
    last_batch: Option<Instant>,
    deferred: Option<JoinHandle<()>>,
}

impl ReadReceiptBatcher {
    pub fn new(store: StoreHandle, user: UserId, config: &SyncConfig) -> Self {
        Self {
            store,
            user,
            coalesce: config.receipt_coalesce,
            last_batch: None,
            deferred: None,
        }
    }

    /// Messages sent by peers that the local user has not read yet. Never
    /// selects already-read messages, so a receipt write can only move a
    /// status forward.
    pub fn unread_from_peers(messages: &[Message], local: &UserId) -> Vec<MessageId> {
        messages
            .iter()
            .filter(|message| message.sender != *local)
            .filter(|message| message.status != MessageStatus::Read)
            .map(|message| message.id.clone())
            .collect()
    }

    /// Scan the active conversation's latest message set and issue (or
    /// defer) one batched status update. Returns how many messages the
    /// immediate batch covered.
    pub async fn on_messages(
        &mut self,
        conversation: &ConversationId,
        messages: &[Message],
    ) -> usize {
        // A fresher scan supersedes any batch still waiting on the window.
        if let Some(deferred) = self.deferred.take() {
            deferred.abort();
        }
        let unread = Self::unread_from_peers(messages, &self.user);
        if unread.is_empty() {
            return 0;
        }

        let now = Instant::now();
        if let Some(at) = self.last_batch {
            let since = now.duration_since(at);
            if since < self.coalesce {
                let delay = self.coalesce - since;
                let store = self.store.clone();
                let writes = receipt_writes(conversation, &unread);
                debug!(
                    conversation = %conversation,
                    count = unread.len(),
                    "deferring read-receipt batch to the window edge"
                );
                self.deferred = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(error) = store.batch(writes).await {
                        warn!(%error, "deferred read-receipt batch failed");
                    }
                }));
                return 0;
            }
        }

        self.last_batch = Some(now);
        let count = unread.len();
        match self.store.batch(receipt_writes(conversation, &unread)).await {
            Ok(()) => {
                debug!(conversation = %conversation, count, "marked messages read");
                count
            }
            Err(error) => {
                warn!(conversation = %conversation, %error, "read-receipt batch failed");
                0
            }
        }
    }
}

fn receipt_writes(conversation: &ConversationId, unread: &[MessageId]) -> Vec<BatchWrite> {
    unread
        .iter()
        .map(|id| BatchWrite::Update {
            path: DocPath::message(conversation, id),
            ops: vec![FieldOp::Set(
                FieldPath::new("status"),
                json!(MessageStatus::Read),
            )],
        })
        .collect()
}
