//! Conversation synchronization: the membership-scoped conversation list,
//! the single active conversation, optimistic sends, clear-history
//! watermarks and unread bookkeeping.
//!
//! The synchronizer owns exactly one active-conversation subscription at a
//! time; opening a conversation tears down the previous one first. Derived
//! state is recomputed from the latest snapshot on every delivery rather
//! than patched incrementally, so out-of-order updates from independent
//! writers cannot corrupt the view.

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use courier_shared::time::{now_millis, Millis};
use courier_shared::types::{ConversationId, ConversationKind, MessageId, MessageStatus, UserId};
use courier_store::{
    paths, to_fields, BatchWrite, Conversation, DocPath, Direction, Document, FieldOp, FieldPath,
    Filter, LastMessage, Message, MessageBody, Query, ReplyPreview, StoreHandle, Subscription,
};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::views::{self, LocalDelivery, TimelineEntry};

/// Live, sorted view of every conversation the user belongs to.
pub struct ConversationListWatch {
    sub: Subscription,
}

impl ConversationListWatch {
    /// Next list state: pinned first, then last-message time descending,
    /// ties broken by id.
    pub async fn next(&mut self) -> Option<Vec<Conversation>> {
        let snapshot = self.sub.next().await?;
        let mut list = decode_all::<Conversation>(&snapshot);
        views::sort_conversations(&mut list);
        Some(list)
    }

    pub async fn cancel(&mut self) {
        self.sub.cancel().await;
    }
}

fn decode_all<T: DeserializeOwned>(snapshot: &[Document]) -> Vec<T> {
    snapshot
        .iter()
        .filter_map(|doc| match doc.decode() {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(path = %doc.path, %error, "skipping undecodable document");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingState {
    InFlight,
    Failed,
}

/// An optimistic local placeholder awaiting store confirmation.
#[derive(Debug, Clone)]
struct PendingMessage {
    message: Message,
    /// Client clock at send time; sorts the placeholder until the store
    /// stamps the real timestamp.
    local_timestamp: Millis,
    state: PendingState,
}

struct ActiveConversation {
    conversation: Conversation,
    sub: Subscription,
    /// Latest snapshot, ascending by (timestamp, id).
    confirmed: Vec<Message>,
    pending: Vec<PendingMessage>,
    /// Id of a just-deleted tail message. The summary is recomputed from
    /// the snapshot that reflects the deletion, never from cached state, so
    /// a message a concurrent deleter removed cannot be resurrected.
    summary_refresh: Option<MessageId>,
}

pub struct ConversationSynchronizer {
    store: StoreHandle,
    user: UserId,
    display_name: String,
    config: SyncConfig,
    active: Option<ActiveConversation>,
}

impl ConversationSynchronizer {
    pub fn new(
        store: StoreHandle,
        user: UserId,
        display_name: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            user,
            display_name: display_name.into(),
            config,
            active: None,
        }
    }

    pub async fn subscribe_conversation_list(&self) -> Result<ConversationListWatch> {
        let query = Query::collection(paths::CONVERSATIONS).filter(Filter::ArrayContains(
            FieldPath::new("members"),
            json!(self.user),
        ));
        Ok(ConversationListWatch {
            sub: self.store.subscribe(query).await?,
        })
    }

    /// Idempotently ensure the direct conversation with `peer` exists. Only
    /// immutable fields are set, so re-running never clobbers live counters
    /// or watermarks.
    pub async fn ensure_direct(&self, peer: &UserId) -> Result<ConversationId> {
        let id = ConversationId::direct(&self.user, peer);
        let ops = vec![
            FieldOp::Set(FieldPath::new("id"), json!(id)),
            FieldOp::Set(FieldPath::new("kind"), json!(ConversationKind::Direct)),
            FieldOp::Set(
                FieldPath::new("members"),
                json!([self.user.clone(), peer.clone()]),
            ),
            FieldOp::SetServerTime(FieldPath::new("created_at")),
        ];
        self.store.update(DocPath::conversation(&id), ops).await?;
        Ok(id)
    }

    /// Ensure the user's private self-notes store exists.
    pub async fn ensure_self_notes(&self) -> Result<ConversationId> {
        let id = ConversationId::self_notes(&self.user);
        let ops = vec![
            FieldOp::Set(FieldPath::new("id"), json!(id)),
            FieldOp::Set(FieldPath::new("kind"), json!(ConversationKind::SelfNotes)),
            FieldOp::Set(FieldPath::new("members"), json!([self.user.clone()])),
            FieldOp::SetServerTime(FieldPath::new("created_at")),
        ];
        self.store.update(DocPath::conversation(&id), ops).await?;
        Ok(id)
    }

    /// Create a group conversation. The creator's unread counter starts at
    /// zero.
    pub async fn create_group(&self, name: &str, members: &[UserId]) -> Result<ConversationId> {
        let id = ConversationId::group();
        let mut all = vec![self.user.clone()];
        for member in members {
            if !all.contains(member) {
                all.push(member.clone());
            }
        }
        let conversation = Conversation {
            id: id.clone(),
            kind: ConversationKind::Group,
            members: all,
            name: Some(name.to_string()),
            last_message: None,
            unread: [(self.user.to_string(), 0)].into_iter().collect(),
            cleared: Default::default(),
            pinned: false,
            pinned_message: None,
            created_at: now_millis(),
        };
        self.store
            .write(DocPath::conversation(&id), to_fields(&conversation)?)
            .await?;
        debug!(conversation = %id, members = conversation.members.len(), "group created");
        Ok(id)
    }

    /// Open a conversation: tear down the previous message subscription,
    /// subscribe the most-recent page, and reset this member's unread
    /// counter. Other members' counters are untouched.
    pub async fn open(&mut self, conversation: Conversation) -> Result<()> {
        if let Some(mut previous) = self.active.take() {
            previous.sub.cancel().await;
        }
        let query = Query::collection(paths::messages_collection(&conversation.id))
            .order_by(FieldPath::new("timestamp"), Direction::Descending)
            .limit(self.config.page_size);
        let sub = self.store.subscribe(query).await?;
        self.store
            .update(
                DocPath::conversation(&conversation.id),
                vec![FieldOp::Set(
                    FieldPath::nested("unread", self.user.as_str()),
                    json!(0),
                )],
            )
            .await?;
        debug!(conversation = %conversation.id, "conversation opened");
        self.active = Some(ActiveConversation {
            conversation,
            sub,
            confirmed: Vec::new(),
            pending: Vec::new(),
            summary_refresh: None,
        });
        Ok(())
    }

    /// Leave the active conversation, cancelling its subscription.
    pub async fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.sub.cancel().await;
            debug!(conversation = %active.conversation.id, "conversation closed");
        }
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref().map(|active| &active.conversation)
    }

    /// The latest confirmed message set of the active conversation,
    /// ascending. Feed this to the read-receipt batcher and the reaction
    /// intent reconciler.
    pub fn confirmed(&self) -> &[Message] {
        self.active
            .as_ref()
            .map(|active| active.confirmed.as_slice())
            .unwrap_or(&[])
    }

    /// Await the next message snapshot, reconcile placeholders and return
    /// the timeline. A placeholder is dropped the moment its id appears in
    /// a snapshot, so the re-sort onto the stamped timestamp is idempotent
    /// and never duplicates the message.
    pub async fn next_timeline(&mut self) -> Option<Vec<TimelineEntry>> {
        let snapshot = match self.active.as_mut() {
            Some(active) => active.sub.next().await?,
            None => return None,
        };
        let refresh = match self.active.as_mut() {
            Some(active) => {
                let mut confirmed = decode_all::<Message>(&snapshot);
                // The page query returns newest-first; display order is
                // ascending.
                confirmed.reverse();
                active.confirmed = confirmed;
                active
                    .pending
                    .retain(|pending| !active.confirmed.iter().any(|m| m.id == pending.message.id));
                match active.summary_refresh.take() {
                    Some(deleted) if !active.confirmed.iter().any(|m| m.id == deleted) => true,
                    // This snapshot predates the deletion; keep waiting.
                    Some(deleted) => {
                        active.summary_refresh = Some(deleted);
                        false
                    }
                    None => false,
                }
            }
            None => return None,
        };
        if refresh {
            self.refresh_last_message().await;
        }
        Some(self.timeline())
    }

    /// Current timeline: watermark-filtered confirmed messages merged with
    /// local placeholders, ascending, grouped later by the view layer.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        let Some(active) = &self.active else {
            return Vec::new();
        };
        let watermark = active.conversation.watermark_for(&self.user);
        let mut entries: Vec<TimelineEntry> = active
            .confirmed
            .iter()
            .filter(|message| message.timestamp.is_some_and(|ts| ts > watermark))
            .map(|message| TimelineEntry {
                message: message.clone(),
                delivery: LocalDelivery::Confirmed,
                sort_key: message.timestamp.unwrap_or_default(),
            })
            .collect();
        for pending in &active.pending {
            entries.push(TimelineEntry {
                message: pending.message.clone(),
                delivery: match pending.state {
                    PendingState::InFlight => LocalDelivery::Sending,
                    PendingState::Failed => LocalDelivery::Failed,
                },
                sort_key: pending.local_timestamp,
            });
        }
        entries.sort_by(|a, b| {
            a.sort_key
                .cmp(&b.sort_key)
                .then_with(|| a.message.id.cmp(&b.message.id))
        });
        entries
    }

    /// Optimistic send: append a local placeholder, write the message, then
    /// update the summary and increment every *other* member's unread
    /// counter atomically. On failure the placeholder is marked failed and
    /// is not retried automatically; use [`Self::resend`].
    pub async fn send_message(
        &mut self,
        body: MessageBody,
        reply_to: Option<&Message>,
    ) -> Result<MessageId> {
        let (conversation, message, local_timestamp) = {
            let active = self
                .active
                .as_mut()
                .ok_or(SyncError::NoActiveConversation)?;
            let reply = reply_to.map(|target| ReplyPreview {
                target: target.id.clone(),
                sender_name: if target.sender == self.user {
                    "You".to_string()
                } else {
                    target.sender.to_string()
                },
                excerpt: target.body.summary(),
            });
            let message = Message {
                id: MessageId::new(),
                sender: self.user.clone(),
                body,
                timestamp: None,
                status: MessageStatus::Sent,
                edited: false,
                reply,
                reactions: Default::default(),
            };
            let local_timestamp = now_millis();
            active.pending.push(PendingMessage {
                message: message.clone(),
                local_timestamp,
                state: PendingState::InFlight,
            });
            (active.conversation.clone(), message, local_timestamp)
        };

        match self
            .write_message(&conversation, &message, local_timestamp)
            .await
        {
            Ok(()) => Ok(message.id),
            Err(error) => {
                warn!(message = %message.id, %error, "send failed; placeholder marked");
                self.mark_failed(&message.id);
                Err(SyncError::SendFailed(message.id))
            }
        }
    }

    /// Explicitly retry a failed placeholder.
    pub async fn resend(&mut self, id: &MessageId) -> Result<()> {
        let (conversation, message, local_timestamp) = {
            let active = self
                .active
                .as_mut()
                .ok_or(SyncError::NoActiveConversation)?;
            let pending = active
                .pending
                .iter_mut()
                .find(|pending| &pending.message.id == id && pending.state == PendingState::Failed)
                .ok_or_else(|| SyncError::UnknownMessage(id.clone()))?;
            pending.state = PendingState::InFlight;
            (
                active.conversation.clone(),
                pending.message.clone(),
                pending.local_timestamp,
            )
        };
        match self
            .write_message(&conversation, &message, local_timestamp)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(message = %id, %error, "resend failed");
                self.mark_failed(id);
                Err(SyncError::SendFailed(id.clone()))
            }
        }
    }

    async fn write_message(
        &self,
        conversation: &Conversation,
        message: &Message,
        summary_timestamp: Millis,
    ) -> Result<()> {
        let mut ops = Vec::new();
        for (field, value) in to_fields(message)? {
            // The creation timestamp is stamped by the store, not us.
            if field == "timestamp" {
                continue;
            }
            ops.push(FieldOp::Set(FieldPath::new(field), value));
        }
        ops.push(FieldOp::SetServerTime(FieldPath::new("timestamp")));
        self.store
            .update(DocPath::message(&conversation.id, &message.id), ops)
            .await?;

        let summary = LastMessage {
            text: message.body.summary(),
            timestamp: summary_timestamp,
            sender: self.user.clone(),
            sender_name: Some(self.display_name.clone()),
        };
        let mut conversation_ops = vec![FieldOp::Set(
            FieldPath::new("last_message"),
            json!(summary),
        )];
        for member in conversation.others(&self.user) {
            conversation_ops.push(FieldOp::Increment(
                FieldPath::nested("unread", member.as_str()),
                1,
            ));
        }
        if let Err(error) = self
            .store
            .update(DocPath::conversation(&conversation.id), conversation_ops)
            .await
        {
            // The message itself landed; the summary heals on the next
            // send or delete.
            warn!(conversation = %conversation.id, %error, "summary update failed");
        }
        Ok(())
    }

    fn mark_failed(&mut self, id: &MessageId) {
        if let Some(active) = self.active.as_mut() {
            if let Some(pending) = active
                .pending
                .iter_mut()
                .find(|pending| &pending.message.id == id)
            {
                pending.state = PendingState::Failed;
            }
        }
    }

    /// Edit a message in place. Sender-only; id and timestamp are kept, and
    /// the conversation summary is not rewritten on edit. Editing a message
    /// that has since disappeared is a no-op.
    pub async fn edit_message(&mut self, id: &MessageId, new_text: &str) -> Result<()> {
        let conversation_id = {
            let active = self
                .active
                .as_ref()
                .ok_or(SyncError::NoActiveConversation)?;
            let Some(message) = active.confirmed.iter().find(|m| &m.id == id) else {
                return Ok(());
            };
            if message.sender != self.user {
                return Err(SyncError::NotSender(id.clone()));
            }
            active.conversation.id.clone()
        };
        self.store
            .update(
                DocPath::message(&conversation_id, id),
                vec![
                    FieldOp::Set(FieldPath::new("text"), json!(new_text)),
                    FieldOp::Set(FieldPath::new("edited"), json!(true)),
                ],
            )
            .await?;
        Ok(())
    }

    /// Delete a message. If it was the conversation's most recent, the
    /// summary is recomputed from the snapshot reflecting the deletion.
    pub async fn delete_message(&mut self, id: &MessageId) -> Result<()> {
        let conversation_id = {
            let active = self
                .active
                .as_mut()
                .ok_or(SyncError::NoActiveConversation)?;
            // A placeholder that never reached the store dies locally.
            active.pending.retain(|pending| &pending.message.id != id);
            if active.confirmed.last().is_some_and(|m| &m.id == id) {
                active.summary_refresh = Some(id.clone());
            }
            active.conversation.id.clone()
        };
        self.store
            .delete(DocPath::message(&conversation_id, id))
            .await?;
        Ok(())
    }

    /// Delete several messages in one atomic batch.
    pub async fn delete_messages(&mut self, ids: &[MessageId]) -> Result<()> {
        let conversation_id = {
            let active = self
                .active
                .as_mut()
                .ok_or(SyncError::NoActiveConversation)?;
            active
                .pending
                .retain(|pending| !ids.contains(&pending.message.id));
            if active
                .confirmed
                .last()
                .is_some_and(|m| ids.contains(&m.id))
            {
                active.summary_refresh = active.confirmed.last().map(|m| m.id.clone());
            }
            active.conversation.id.clone()
        };
        let writes = ids
            .iter()
            .map(|id| BatchWrite::Delete {
                path: DocPath::message(&conversation_id, id),
            })
            .collect();
        self.store.batch(writes).await?;
        Ok(())
    }

    /// Clear the caller's own history. For ordinary conversations this only
    /// moves the caller's watermark; other members keep every message. For
    /// the private self-notes store, deletion is permanent.
    pub async fn clear_history(&mut self) -> Result<()> {
        let (conversation_id, kind, confirmed_ids) = {
            let active = self
                .active
                .as_ref()
                .ok_or(SyncError::NoActiveConversation)?;
            (
                active.conversation.id.clone(),
                active.conversation.kind,
                active
                    .confirmed
                    .iter()
                    .map(|m| m.id.clone())
                    .collect::<Vec<_>>(),
            )
        };
        if kind == ConversationKind::SelfNotes {
            let mut writes: Vec<BatchWrite> = confirmed_ids
                .iter()
                .map(|id| BatchWrite::Delete {
                    path: DocPath::message(&conversation_id, id),
                })
                .collect();
            writes.push(BatchWrite::Update {
                path: DocPath::conversation(&conversation_id),
                ops: vec![FieldOp::Delete(FieldPath::new("last_message"))],
            });
            self.store.batch(writes).await?;
            if let Some(active) = self.active.as_mut() {
                active.pending.clear();
            }
        } else {
            self.store
                .update(
                    DocPath::conversation(&conversation_id),
                    vec![FieldOp::SetServerTime(FieldPath::nested(
                        "cleared",
                        self.user.as_str(),
                    ))],
                )
                .await?;
            // Apply locally so the view updates before the list snapshot
            // catches up.
            if let Some(active) = self.active.as_mut() {
                active
                    .conversation
                    .cleared
                    .insert(self.user.to_string(), now_millis());
            }
        }
        debug!(conversation = %conversation_id, "history cleared");
        Ok(())
    }

    /// Pin a message to the conversation (or unpin with `None`).
    pub async fn pin_message(
        &self,
        conversation: &ConversationId,
        message: Option<&MessageId>,
    ) -> Result<()> {
        let op = match message {
            Some(id) => FieldOp::Set(FieldPath::new("pinned_message"), json!(id)),
            None => FieldOp::Delete(FieldPath::new("pinned_message")),
        };
        self.store
            .update(DocPath::conversation(conversation), vec![op])
            .await?;
        Ok(())
    }

    /// Pin or unpin the conversation in the list ordering.
    pub async fn set_pinned(&self, conversation: &ConversationId, pinned: bool) -> Result<()> {
        self.store
            .update(
                DocPath::conversation(conversation),
                vec![FieldOp::Set(FieldPath::new("pinned"), json!(pinned))],
            )
            .await?;
        Ok(())
    }

    async fn refresh_last_message(&mut self) {
        let (conversation_id, summary) = match &self.active {
            Some(active) => (
                active.conversation.id.clone(),
                active.confirmed.last().map(|message| LastMessage {
                    text: message.body.summary(),
                    timestamp: message.timestamp.unwrap_or_else(now_millis),
                    sender: message.sender.clone(),
                    sender_name: None,
                }),
            ),
            None => return,
        };
        let op = match summary {
            Some(last) => FieldOp::Set(FieldPath::new("last_message"), json!(last)),
            None => FieldOp::Delete(FieldPath::new("last_message")),
        };
        if let Err(error) = self
            .store
            .update(DocPath::conversation(&conversation_id), vec![op])
            .await
        {
            warn!(conversation = %conversation_id, %error, "summary recompute failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_store::spawn_memory_store;
    use std::time::Duration;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_secs(5);

    fn sync(store: &StoreHandle, user: &str) -> ConversationSynchronizer {
        ConversationSynchronizer::new(
            store.clone(),
            UserId::new(user),
            user.to_uppercase(),
            SyncConfig::default(),
        )
    }

    async fn conversation_where(
        watch: &mut ConversationListWatch,
        id: &ConversationId,
        pred: impl Fn(&Conversation) -> bool,
    ) -> Conversation {
        timeout(TICK, async {
            loop {
                let list = watch.next().await.expect("list watch closed");
                if let Some(found) = list.into_iter().find(|c| &c.id == id && pred(c)) {
                    return found;
                }
            }
        })
        .await
        .expect("conversation state never observed")
    }

    async fn entries_where(
        synchronizer: &mut ConversationSynchronizer,
        pred: impl Fn(&[TimelineEntry]) -> bool,
    ) -> Vec<TimelineEntry> {
        timeout(TICK, async {
            loop {
                let entries = synchronizer
                    .next_timeline()
                    .await
                    .expect("message subscription closed");
                if pred(&entries) {
                    return entries;
                }
            }
        })
        .await
        .expect("timeline state never observed")
    }

    #[tokio::test]
    async fn unread_counters_track_absent_members_individually() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let group = alice
            .create_group("trio", &[UserId::new("bob"), UserId::new("carol")])
            .await
            .unwrap();

        let mut list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut list, &group, |_| true).await;
        alice.open(conversation).await.unwrap();
        alice.next_timeline().await.unwrap();

        alice
            .send_message(MessageBody::text("one"), None)
            .await
            .unwrap();
        alice
            .send_message(MessageBody::text("two"), None)
            .await
            .unwrap();

        // Two absent members, one increment each per message.
        let conversation = conversation_where(&mut list, &group, |c| {
            c.unread_for(&UserId::new("bob")) == 2 && c.unread_for(&UserId::new("carol")) == 2
        })
        .await;
        assert_eq!(conversation.unread_for(&UserId::new("alice")), 0);

        // Bob opening resets exactly his own counter.
        let mut bob = sync(&store, "bob");
        let mut bob_list = bob.subscribe_conversation_list().await.unwrap();
        let bob_conversation = conversation_where(&mut bob_list, &group, |_| true).await;
        bob.open(bob_conversation).await.unwrap();

        let conversation =
            conversation_where(&mut list, &group, |c| c.unread_for(&UserId::new("bob")) == 0)
                .await;
        assert_eq!(conversation.unread_for(&UserId::new("carol")), 2);
    }

    #[tokio::test]
    async fn send_confirms_placeholder_without_duplication() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let id = alice.ensure_direct(&UserId::new("bob")).await.unwrap();

        let mut list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut list, &id, |_| true).await;
        alice.open(conversation).await.unwrap();
        assert!(alice.next_timeline().await.unwrap().is_empty());

        let message_id = alice
            .send_message(MessageBody::text("hello"), None)
            .await
            .unwrap();
        let entries = entries_where(&mut alice, |e| !e.is_empty()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.id, message_id);
        assert_eq!(entries[0].delivery, LocalDelivery::Confirmed);
        assert!(entries[0].message.timestamp.is_some());

        let conversation =
            conversation_where(&mut list, &id, |c| c.last_message.is_some()).await;
        let last = conversation.last_message.unwrap();
        assert_eq!(last.text, "hello");
        assert_eq!(last.sender, UserId::new("alice"));
        assert_eq!(last.sender_name.as_deref(), Some("ALICE"));
    }

    #[tokio::test]
    async fn clear_history_hides_only_the_clearing_member() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let mut bob = sync(&store, "bob");
        let id = alice.ensure_direct(&UserId::new("bob")).await.unwrap();

        let mut alice_list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut alice_list, &id, |_| true).await;
        alice.open(conversation).await.unwrap();
        alice.next_timeline().await.unwrap();
        alice
            .send_message(MessageBody::text("one"), None)
            .await
            .unwrap();
        alice
            .send_message(MessageBody::text("two"), None)
            .await
            .unwrap();
        entries_where(&mut alice, |e| e.len() == 2).await;

        let mut bob_list = bob.subscribe_conversation_list().await.unwrap();
        let bob_conversation = conversation_where(&mut bob_list, &id, |_| true).await;
        bob.open(bob_conversation).await.unwrap();
        entries_where(&mut bob, |e| e.len() == 2).await;

        bob.clear_history().await.unwrap();
        assert!(bob.timeline().is_empty());
        // The other member keeps the full history.
        assert_eq!(alice.timeline().len(), 2);
    }

    #[tokio::test]
    async fn deleting_the_tail_message_recomputes_the_summary() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let id = alice.ensure_direct(&UserId::new("bob")).await.unwrap();

        let mut list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut list, &id, |_| true).await;
        alice.open(conversation).await.unwrap();
        alice.next_timeline().await.unwrap();

        alice
            .send_message(MessageBody::text("one"), None)
            .await
            .unwrap();
        entries_where(&mut alice, |e| e.len() == 1).await;
        let second = alice
            .send_message(MessageBody::text("two"), None)
            .await
            .unwrap();
        entries_where(&mut alice, |e| e.len() == 2).await;

        alice.delete_message(&second).await.unwrap();
        let entries = entries_where(&mut alice, |e| e.len() == 1).await;
        assert_eq!(entries[0].message.body.text, "one");

        let conversation = conversation_where(&mut list, &id, |c| {
            c.last_message.as_ref().is_some_and(|l| l.text == "one")
        })
        .await;
        assert!(conversation.last_message.is_some());
    }

    #[tokio::test]
    async fn edit_is_sender_only_and_tolerates_missing_targets() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let mut bob = sync(&store, "bob");
        let id = alice.ensure_direct(&UserId::new("bob")).await.unwrap();

        let mut alice_list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut alice_list, &id, |_| true).await;
        alice.open(conversation).await.unwrap();
        alice.next_timeline().await.unwrap();
        let message_id = alice
            .send_message(MessageBody::text("helo"), None)
            .await
            .unwrap();
        entries_where(&mut alice, |e| e.len() == 1).await;

        let mut bob_list = bob.subscribe_conversation_list().await.unwrap();
        let bob_conversation = conversation_where(&mut bob_list, &id, |_| true).await;
        bob.open(bob_conversation).await.unwrap();
        entries_where(&mut bob, |e| e.len() == 1).await;

        // Ownership is enforced before any write.
        assert!(matches!(
            bob.edit_message(&message_id, "hacked").await,
            Err(SyncError::NotSender(_))
        ));

        // Editing an id that no longer resolves is a quiet no-op.
        assert!(alice.edit_message(&MessageId::new(), "x").await.is_ok());

        let before = alice.timeline()[0].message.timestamp;
        alice.edit_message(&message_id, "hello").await.unwrap();
        let entries =
            entries_where(&mut alice, |e| e.first().is_some_and(|x| x.message.edited)).await;
        assert_eq!(entries[0].message.body.text, "hello");
        assert_eq!(entries[0].message.timestamp, before);
        assert_eq!(entries[0].message.id, message_id);
    }

    #[tokio::test]
    async fn self_notes_clear_is_permanent() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let id = alice.ensure_self_notes().await.unwrap();

        let mut list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut list, &id, |_| true).await;
        assert_eq!(conversation.kind, ConversationKind::SelfNotes);
        alice.open(conversation).await.unwrap();
        alice.next_timeline().await.unwrap();

        alice
            .send_message(MessageBody::text("note"), None)
            .await
            .unwrap();
        entries_where(&mut alice, |e| e.len() == 1).await;

        alice.clear_history().await.unwrap();
        let entries = entries_where(&mut alice, |e| e.is_empty()).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn reopening_switches_the_single_active_subscription() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let first = alice.ensure_direct(&UserId::new("bob")).await.unwrap();
        let second = alice.ensure_direct(&UserId::new("carol")).await.unwrap();

        let mut list = alice.subscribe_conversation_list().await.unwrap();
        let first_conversation = conversation_where(&mut list, &first, |_| true).await;
        alice.open(first_conversation).await.unwrap();
        alice.next_timeline().await.unwrap();

        let second_conversation = conversation_where(&mut list, &second, |_| true).await;
        alice.open(second_conversation).await.unwrap();
        alice.next_timeline().await.unwrap();
        assert_eq!(alice.active_conversation().map(|c| c.id.clone()), Some(second));

        alice
            .send_message(MessageBody::text("hi carol"), None)
            .await
            .unwrap();
        let entries = entries_where(&mut alice, |e| !e.is_empty()).await;
        assert_eq!(entries[0].message.body.text, "hi carol");
    }

    #[tokio::test]
    async fn resend_requires_a_failed_placeholder() {
        let store = spawn_memory_store();
        let mut alice = sync(&store, "alice");
        let id = alice.ensure_direct(&UserId::new("bob")).await.unwrap();
        let mut list = alice.subscribe_conversation_list().await.unwrap();
        let conversation = conversation_where(&mut list, &id, |_| true).await;
        alice.open(conversation).await.unwrap();

        assert!(matches!(
            alice.resend(&MessageId::new()).await,
            Err(SyncError::UnknownMessage(_))
        ));
    }
}
