//! Document addressing.
//!
//! Path scheme: `conversations/<cid>`, `conversations/<cid>/messages/<mid>`,
//! `presence/<uid>`, `typing/<cid>/<uid>`, `calls/<sid>`.

use courier_shared::types::{CallId, ConversationId, MessageId, UserId};

/// Fully qualified path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    pub fn conversation(id: &ConversationId) -> Self {
        Self(format!("conversations/{id}"))
    }

    pub fn message(conversation: &ConversationId, id: &MessageId) -> Self {
        Self(format!("conversations/{conversation}/messages/{id}"))
    }

    pub fn presence(user: &UserId) -> Self {
        Self(format!("presence/{user}"))
    }

    pub fn typing(conversation: &ConversationId, user: &UserId) -> Self {
        Self(format!("typing/{conversation}/{user}"))
    }

    pub fn call(id: &CallId) -> Self {
        Self(format!("calls/{id}"))
    }

    /// The collection containing this document (everything before the final
    /// segment).
    pub fn collection(&self) -> &str {
        &self.0[..self.0.rfind('/').unwrap_or(0)]
    }

    /// The final path segment: the document id.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collection path of the messages of one conversation.
pub fn messages_collection(conversation: &ConversationId) -> String {
    format!("conversations/{conversation}/messages")
}

/// Collection path of the typing signals of one conversation.
pub fn typing_collection(conversation: &ConversationId) -> String {
    format!("typing/{conversation}")
}

pub const CONVERSATIONS: &str = "conversations";
pub const CALLS: &str = "calls";
