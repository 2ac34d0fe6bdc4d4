use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A stable user identifier issued by the (external) account layer.
///
/// Treated as opaque text everywhere in the core. Identifiers never contain
/// `.`, which lets them double as keys in nested document field paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation identifier, unique across the deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Deterministic id for the direct conversation between two users.
    ///
    /// The member pair is sorted before formatting, so both sides derive the
    /// same id no matter who opens the conversation first.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        Self(format!("c_{}_{}", lo.0, hi.0))
    }

    /// The per-user "saved messages" pseudo-conversation.
    pub fn self_notes(user: &UserId) -> Self {
        Self(format!("saved_{}", user.0))
    }

    /// A fresh identifier for an explicitly created group.
    pub fn group() -> Self {
        Self(format!("g_{}", Uuid::new_v4()))
    }

    pub fn is_self_notes(&self) -> bool {
        self.0.starts_with("saved_")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a call session record. Never reused across calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Domain enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
    /// The user's private "saved messages" store.
    #[serde(rename = "saved")]
    SelfNotes,
}

/// Delivery status of a message. Transitions only move forward
/// (`Sent -> Read`), never backward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
}

impl MessageStatus {
    /// Whether moving to `next` respects the forward-only rule.
    pub fn can_become(self, next: MessageStatus) -> bool {
        !matches!((self, next), (MessageStatus::Read, MessageStatus::Sent))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Active,
    Ended,
    Declined,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Declined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_id_is_order_independent() {
        let a = UserId::new("alice");
        let b = UserId::new("bob");
        assert_eq!(ConversationId::direct(&a, &b), ConversationId::direct(&b, &a));
        assert_eq!(ConversationId::direct(&a, &b).as_str(), "c_alice_bob");
    }

    #[test]
    fn self_notes_detection() {
        let a = UserId::new("alice");
        assert!(ConversationId::self_notes(&a).is_self_notes());
        assert!(!ConversationId::direct(&a, &UserId::new("bob")).is_self_notes());
    }

    #[test]
    fn status_never_moves_backward() {
        assert!(MessageStatus::Sent.can_become(MessageStatus::Read));
        assert!(MessageStatus::Sent.can_become(MessageStatus::Sent));
        assert!(MessageStatus::Read.can_become(MessageStatus::Read));
        assert!(!MessageStatus::Read.can_become(MessageStatus::Sent));
    }

    #[test]
    fn terminal_call_statuses() {
        assert!(CallStatus::Ended.is_terminal());
        assert!(CallStatus::Declined.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::Active.is_terminal());
    }
}
