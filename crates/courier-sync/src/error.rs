use thiserror::Error;

use courier_shared::types::MessageId;
use courier_store::StoreError;

/// Errors surfaced by the synchronization components. Presence and typing
/// writes are best-effort and never produce these; message-level failures
/// are attached to the specific item so the caller can retry that one
/// action.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The optimistic placeholder was marked failed; retry with
    /// [`crate::ConversationSynchronizer::resend`].
    #[error("Message {0} failed to send")]
    SendFailed(MessageId),

    /// Only the original sender may edit a message.
    #[error("Not the sender of message {0}")]
    NotSender(MessageId),

    #[error("No active conversation")]
    NoActiveConversation,

    /// The referenced message is not in the active window.
    #[error("Unknown message {0}")]
    UnknownMessage(MessageId),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
