//! The local media layer boundary.
//!
//! Device acquisition and session-description negotiation live outside the
//! core; the engine only needs this seam. Descriptors are opaque strings -
//! the core cares about their presence, never their contents.

use thiserror::Error;

use courier_shared::types::CallKind;

#[derive(Error, Debug)]
pub enum MediaError {
    /// Microphone/camera acquisition failed.
    #[error("Media device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Media negotiation failed: {0}")]
    Negotiation(String),
}

/// Capability the engine requires from the media layer.
pub trait MediaSource: Send {
    /// Acquire capture devices for a call of `kind`.
    fn acquire(&mut self, kind: CallKind) -> Result<(), MediaError>;

    /// Produce the local session-description offer. Requires acquired
    /// media.
    fn create_offer(&mut self) -> Result<String, MediaError>;

    /// Consume the remote offer and produce the local answer.
    fn accept_offer(&mut self, offer: &str) -> Result<String, MediaError>;

    /// Complete negotiation with the remote answer (caller side).
    fn finalize(&mut self, answer: &str) -> Result<(), MediaError>;

    /// Release all acquired devices. Must be idempotent.
    fn release(&mut self);
}
