//! Typing indicators: an ephemeral per-conversation flag for the local
//! user, and a staleness-filtered view of peers' flags.
//!
//! Write side: the first keystroke after an idle period writes the flag
//! immediately, every keystroke restarts a trailing timer that clears it,
//! and send/leave clear it at once. Read side: a signal older than the
//! staleness window is treated as false regardless of its stored value,
//! because the record may lag its writer's intent.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use courier_shared::time::{now_millis, Millis};
use courier_shared::types::{ConversationId, UserId};
use courier_store::{paths, DocPath, FieldOp, FieldPath, Query, StoreHandle, Subscription, TypingSignal};

use crate::config::SyncConfig;
use crate::error::Result;

pub struct TypingController {
    store: StoreHandle,
    user: UserId,
    idle_clear: Duration,
    staleness_ms: i64,
    last_input: Option<(ConversationId, Instant)>,
    clear_timer: Option<JoinHandle<()>>,
}

impl TypingController {
    pub fn new(store: StoreHandle, user: UserId, config: &SyncConfig) -> Self {
        Self {
            store,
            user,
            idle_clear: config.typing_idle_clear,
            staleness_ms: config.typing_staleness_ms,
            last_input: None,
            clear_timer: None,
        }
    }

    /// Called on every keystroke burst. Writes the flag only on the first
    /// keystroke after idleness; always restarts the trailing clear timer.
    /// No signal is ever written for the self-notes pseudo-conversation.
    pub async fn on_local_input(&mut self, conversation: &ConversationId) {
        if conversation.is_self_notes() {
            return;
        }
        let now = Instant::now();
        let was_active = matches!(
            &self.last_input,
            Some((active, at))
                if active == conversation && now.duration_since(*at) < self.idle_clear
        );
        self.last_input = Some((conversation.clone(), now));
        if !was_active {
            self.write_flag(conversation, true).await;
        }
        self.restart_timer(conversation.clone());
    }

    /// Clear immediately on message send, bypassing the trailing timer.
    pub async fn on_send(&mut self, conversation: &ConversationId) {
        self.clear(conversation).await;
    }

    /// Clear immediately when the conversation is left or closed.
    pub async fn on_leave(&mut self, conversation: &ConversationId) {
        self.clear(conversation).await;
    }

    async fn clear(&mut self, conversation: &ConversationId) {
        if let Some(timer) = self.clear_timer.take() {
            timer.abort();
        }
        self.last_input = None;
        if conversation.is_self_notes() {
            return;
        }
        self.write_flag(conversation, false).await;
    }

    async fn write_flag(&self, conversation: &ConversationId, typing: bool) {
        let path = DocPath::typing(conversation, &self.user);
        let ops = signal_ops(conversation, &self.user, typing);
        if let Err(error) = self.store.update(path, ops).await {
            // Best-effort: a lost clear falls back to the read-side window.
            debug!(conversation = %conversation, %error, "typing write failed");
        }
    }

    fn restart_timer(&mut self, conversation: ConversationId) {
        if let Some(timer) = self.clear_timer.take() {
            timer.abort();
        }
        let store = self.store.clone();
        let user = self.user.clone();
        let idle = self.idle_clear;
        self.clear_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let path = DocPath::typing(&conversation, &user);
            let ops = signal_ops(&conversation, &user, false);
            if let Err(error) = store.update(path, ops).await {
                debug!(conversation = %conversation, %error, "trailing typing clear failed");
            }
        }));
    }

    /// Live set of peers currently typing in `conversation`.
    pub async fn observe(&self, conversation: &ConversationId) -> Result<TypingWatch> {
        let sub = self
            .store
            .subscribe(Query::collection(paths::typing_collection(conversation)))
            .await?;
        Ok(TypingWatch {
            sub,
            local: self.user.clone(),
            staleness_ms: self.staleness_ms,
        })
    }
}

fn signal_ops(conversation: &ConversationId, user: &UserId, typing: bool) -> Vec<FieldOp> {
    vec![
        FieldOp::Set(FieldPath::new("conversation"), json!(conversation)),
        FieldOp::Set(FieldPath::new("user"), json!(user)),
        FieldOp::Set(FieldPath::new("typing"), json!(typing)),
        FieldOp::SetServerTime(FieldPath::new("updated_at")),
    ]
}

pub struct TypingWatch {
    sub: Subscription,
    local: UserId,
    staleness_ms: i64,
}

impl TypingWatch {
    /// Next set of peers typing right now. The caller formats the set
    /// (name list vs. count) as it sees fit.
    pub async fn next(&mut self) -> Option<BTreeSet<UserId>> {
        let snapshot = self.sub.next().await?;
        let signals: Vec<TypingSignal> = snapshot
            .iter()
            .filter_map(|doc| doc.decode().ok())
            .collect();
        Some(active_typists(
            &signals,
            &self.local,
            now_millis(),
            self.staleness_ms,
        ))
    }

    pub async fn cancel(&mut self) {
        self.sub.cancel().await;
    }
}

/// The read-side staleness filter: peers whose flag is true *and* fresh.
/// The local user never appears in the result.
pub fn active_typists(
    signals: &[TypingSignal],
    local: &UserId,
    now: Millis,
    staleness_ms: i64,
) -> BTreeSet<UserId> {
    signals
        .iter()
        .filter(|signal| signal.typing)
        .filter(|signal| signal.user != *local)
        .filter(|signal| now - signal.updated_at <= staleness_ms)
        .map(|signal| signal.user.clone())
        .collect()
}
