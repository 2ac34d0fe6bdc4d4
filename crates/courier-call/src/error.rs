use thiserror::Error;

use courier_store::StoreError;

use crate::media::MediaError;

/// Errors produced by the call engine. A media failure aborts the state
/// transition before any signaling write; a signaling failure after media
/// was acquired releases it before surfacing here.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] StoreError),

    /// The requested operation is not valid in the current call state.
    #[error("Invalid call state: {0}")]
    InvalidState(&'static str),
}

pub type Result<T> = std::result::Result<T, CallError>;
