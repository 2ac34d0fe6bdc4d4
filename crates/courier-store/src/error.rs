use thiserror::Error;

/// Errors produced by the store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient failure (network loss, backend briefly unreachable).
    /// Recovered by re-issuing on the next user-triggered event or snapshot
    /// delivery, never by a tight retry loop.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the operation (permission or ownership
    /// violation). Not retried.
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// The addressed document does not exist.
    #[error("Document not found")]
    NotFound,

    /// The store task has shut down and the command channel is closed.
    #[error("Store connection closed")]
    Closed,

    /// Document (de)serialization failure.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
