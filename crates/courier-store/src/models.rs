//! Document schemas for every record the core reads or writes.
//!
//! Every struct derives `Serialize` and `Deserialize` and round-trips
//! through the JSON field maps of the store boundary. Optional fields carry
//! defaults so partially populated documents from older writers still
//! decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use courier_shared::time::Millis;
use courier_shared::types::{
    CallId, CallKind, CallStatus, ConversationId, ConversationKind, MessageId, MessageStatus,
    UserId,
};

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// A user's presence record. Single-writer: only the owning client mutates
/// it, so a reader must treat the `online` flag as advisory once the
/// heartbeat is stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub id: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub online: bool,
    /// Epoch millis of the last refresh, stamped by the store.
    #[serde(default)]
    pub last_active: Millis,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Denormalized summary of a conversation's most recent message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub timestamp: Millis,
    pub sender: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Member identifiers. Mutated only via atomic union/difference.
    pub members: Vec<UserId>,
    /// Display name for groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Per-member unread counters, keyed by user id. Mutated only via
    /// atomic increments; wholesale overwrite loses concurrent updates.
    #[serde(default)]
    pub unread: BTreeMap<String, u32>,
    /// Per-member clear-history watermarks (epoch millis), keyed by user
    /// id. A message is visible to a member only if its timestamp is
    /// strictly greater than that member's watermark.
    #[serde(default)]
    pub cleared: BTreeMap<String, Millis>,
    /// Pinned-to-top flag for the conversation list.
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_message: Option<MessageId>,
    #[serde(default)]
    pub created_at: Millis,
}

impl Conversation {
    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread.get(user.as_str()).copied().unwrap_or(0)
    }

    pub fn watermark_for(&self, user: &UserId) -> Millis {
        self.cleared.get(user.as_str()).copied().unwrap_or(0)
    }

    /// Every member except `user`.
    pub fn others<'a>(&'a self, user: &'a UserId) -> impl Iterator<Item = &'a UserId> {
        self.members.iter().filter(move |member| *member != user)
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Message content: text and/or a media reference and/or a voice clip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBody {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Human-readable size, e.g. "12.4 KB".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
    /// Voice clip length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_duration: Option<u32>,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// One-line summary for the conversation list.
    pub fn summary(&self) -> String {
        if self.voice_url.is_some() {
            "🎙 Voice message".to_string()
        } else if self.image_url.is_some() {
            "🖼 Photo".to_string()
        } else if self.file_url.is_some() {
            "📎 File".to_string()
        } else {
            self.text.clone()
        }
    }
}

/// Denormalized snapshot of a replied-to message, taken at reply time.
/// A copy, not a live join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyPreview {
    pub target: MessageId,
    pub sender_name: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    #[serde(flatten)]
    pub body: MessageBody,
    /// Creation time stamped by the store, not the client clock. `None`
    /// while an optimistic placeholder awaits confirmation.
    #[serde(default)]
    pub timestamp: Option<Millis>,
    #[serde(default = "default_status")]
    pub status: MessageStatus,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyPreview>,
    /// Emoji → reactor ids. Mutated only via atomic union/difference.
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<UserId>>,
}

fn default_status() -> MessageStatus {
    MessageStatus::Sent
}

impl Message {
    pub fn reactors(&self, emoji: &str) -> &[UserId] {
        self.reactions.get(emoji).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_reacted(&self, emoji: &str, user: &UserId) -> bool {
        self.reactors(emoji).contains(user)
    }
}

// ---------------------------------------------------------------------------
// Typing signal
// ---------------------------------------------------------------------------

/// Ephemeral per-conversation typing flag. Single-writer per
/// (conversation, user); readers must discard signals older than the
/// staleness window regardless of the stored flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingSignal {
    pub conversation: ConversationId,
    pub user: UserId,
    #[serde(default)]
    pub typing: bool,
    /// Epoch millis of the last write, stamped by the store.
    #[serde(default)]
    pub updated_at: Millis,
}

// ---------------------------------------------------------------------------
// Call session
// ---------------------------------------------------------------------------

/// Shared record driving a two-party call. Created by the caller, answered
/// by the receiver, terminated by either side. Never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSessionRecord {
    pub id: CallId,
    pub caller: UserId,
    pub receiver: UserId,
    pub status: CallStatus,
    pub kind: CallKind,
    /// Session description produced by the caller's media layer. Opaque to
    /// the core beyond its presence.
    pub offer: String,
    /// Present only once the receiver accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub created_at: Millis,
}
