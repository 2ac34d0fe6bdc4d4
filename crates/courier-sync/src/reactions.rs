//! Reaction toggling.
//!
//! A toggle only ever requests a set-union or set-difference against the
//! canonical reactor set, never an absolute new set, so two users reacting
//! concurrently with different emojis cannot clobber each other.
//! A local intent overlay makes back-to-back toggles net out correctly
//! before the first write has round-tripped through a snapshot.

use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use courier_shared::types::{ConversationId, MessageId, UserId};
use courier_store::{DocPath, FieldOp, FieldPath, Message, StoreHandle};

use crate::error::Result;

pub struct ReactionToggle {
    store: StoreHandle,
    user: UserId,
    /// Last requested state per (message, emoji), kept until the canonical
    /// set confirms it.
    intents: HashMap<(MessageId, String), bool>,
}

impl ReactionToggle {
    pub fn new(store: StoreHandle, user: UserId) -> Self {
        Self {
            store,
            user,
            intents: HashMap::new(),
        }
    }

    /// Add or remove the local user from the emoji's reactor set. Returns
    /// the requested end state (`true` = reacted).
    pub async fn toggle(
        &mut self,
        conversation: &ConversationId,
        message: &Message,
        emoji: &str,
    ) -> Result<bool> {
        let key = (message.id.clone(), emoji.to_string());
        let currently = self
            .intents
            .get(&key)
            .copied()
            .unwrap_or_else(|| message.has_reacted(emoji, &self.user));
        let target = !currently;

        let field = FieldPath::nested("reactions", emoji);
        let values = vec![json!(self.user)];
        let op = if target {
            FieldOp::Union(field, values)
        } else {
            FieldOp::Difference(field, values)
        };
        self.store
            .update(DocPath::message(conversation, &message.id), vec![op])
            .await?;

        debug!(message = %message.id, emoji, target, "reaction toggled");
        self.intents.insert(key, target);
        Ok(target)
    }

    /// Drop intents the canonical state has caught up with. Call with each
    /// reconciled message set.
    pub fn reconcile(&mut self, messages: &[Message]) {
        let user = self.user.clone();
        self.intents.retain(|(message_id, emoji), target| {
            match messages.iter().find(|m| &m.id == message_id) {
                Some(message) => message.has_reacted(emoji, &user) != *target,
                // The message is gone; the intent is moot.
                None => false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_store::{spawn_memory_store, to_fields, MessageBody, Query};
    use courier_shared::types::MessageStatus;
    use std::collections::BTreeMap;

    fn message(id: &str, reactions: BTreeMap<String, Vec<UserId>>) -> Message {
        Message {
            id: MessageId(id.into()),
            sender: UserId::new("peer"),
            body: MessageBody::text("hi"),
            timestamp: Some(1),
            status: MessageStatus::Sent,
            edited: false,
            reply: None,
            reactions,
        }
    }

    async fn seed(store: &StoreHandle, conv: &ConversationId, message: &Message) {
        store
            .write(
                DocPath::message(conv, &message.id),
                to_fields(message).unwrap(),
            )
            .await
            .unwrap();
    }

    async fn reactors(store: &StoreHandle, conv: &ConversationId, id: &str) -> Vec<String> {
        let mut sub = store
            .subscribe(Query::doc(DocPath::message(conv, &MessageId(id.into()))))
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap();
        let decoded: Message = snapshot[0].decode().unwrap();
        decoded
            .reactors("👍")
            .iter()
            .map(|u| u.to_string())
            .collect()
    }

    #[tokio::test]
    async fn double_toggle_restores_the_pre_state() {
        let store = spawn_memory_store();
        let conv = ConversationId("c".into());
        let msg = message("m1", BTreeMap::new());
        seed(&store, &conv, &msg).await;

        let mut toggle = ReactionToggle::new(store.clone(), UserId::new("alice"));
        // Both calls see the same (stale) message value, as on a
        // double-click before any snapshot arrives; the intent overlay
        // makes the second call request a difference.
        assert!(toggle.toggle(&conv, &msg, "👍").await.unwrap());
        assert!(!toggle.toggle(&conv, &msg, "👍").await.unwrap());

        assert!(reactors(&store, &conv, "m1").await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_emojis_do_not_clobber_each_other() {
        let store = spawn_memory_store();
        let conv = ConversationId("c".into());
        let msg = message("m1", BTreeMap::new());
        seed(&store, &conv, &msg).await;

        let mut alice = ReactionToggle::new(store.clone(), UserId::new("alice"));
        let mut bob = ReactionToggle::new(store.clone(), UserId::new("bob"));
        alice.toggle(&conv, &msg, "👍").await.unwrap();
        bob.toggle(&conv, &msg, "🎉").await.unwrap();

        let mut sub = store
            .subscribe(Query::doc(DocPath::message(&conv, &msg.id)))
            .await
            .unwrap();
        let decoded: Message = sub.next().await.unwrap()[0].decode().unwrap();
        assert!(decoded.has_reacted("👍", &UserId::new("alice")));
        assert!(decoded.has_reacted("🎉", &UserId::new("bob")));
    }

    #[tokio::test]
    async fn toggle_removes_an_existing_reaction() {
        let store = spawn_memory_store();
        let conv = ConversationId("c".into());
        let mut reactions = BTreeMap::new();
        reactions.insert("👍".to_string(), vec![UserId::new("alice")]);
        let msg = message("m1", reactions);
        seed(&store, &conv, &msg).await;

        let mut toggle = ReactionToggle::new(store.clone(), UserId::new("alice"));
        assert!(!toggle.toggle(&conv, &msg, "👍").await.unwrap());
        assert!(reactors(&store, &conv, "m1").await.is_empty());
    }

    #[tokio::test]
    async fn reconcile_drops_confirmed_intents() {
        let store = spawn_memory_store();
        let mut toggle = ReactionToggle::new(store, UserId::new("alice"));
        let conv = ConversationId("c".into());
        let msg = message("m1", BTreeMap::new());
        // Intent recorded; the stale message value does not yet confirm it.
        let _ = toggle.toggle(&conv, &msg, "👍").await;
        assert_eq!(toggle.intents.len(), 1);

        // A snapshot that reflects the union clears the intent.
        let mut reactions = BTreeMap::new();
        reactions.insert("👍".to_string(), vec![UserId::new("alice")]);
        toggle.reconcile(&[message("m1", reactions)]);
        assert!(toggle.intents.is_empty());
    }
}
