//! # courier-sync
//!
//! The real-time synchronization core of a chat client: keeps the local
//! view of conversations, presence, typing state, read receipts, reactions
//! and unread counters consistent with a shared remote store that pushes
//! change notifications.
//!
//! Components (one per concern, each owning its own cancellable
//! subscriptions):
//!
//! - [`PresenceManager`]: throttled online/offline publishing, "last seen"
//!   labels.
//! - [`TypingController`]: debounced typing flag writes, staleness-filtered
//!   peer view.
//! - [`ConversationSynchronizer`]: conversation list, the single active
//!   conversation, optimistic sends, watermarks, unread counters.
//! - [`ReadReceiptBatcher`]: one atomic batch per unread scan.
//! - [`ReactionToggle`]: union/difference-only reaction writes.
//!
//! Scheduling model: single-threaded and event driven. Components suspend
//! only at store write and subscription boundaries; each handler body runs
//! to completion, so invariants need protection only across those
//! boundaries. Derived state is recomputed from the latest snapshot, never
//! patched from deltas, which keeps the view correct under arbitrary
//! reordering of independent writers' updates.
//!
//! Teardown: leaving a conversation means cancelling its message
//! subscription ([`ConversationSynchronizer::close`]) and clearing the
//! typing signal ([`TypingController::on_leave`]); the embedding shell
//! invokes both before switching conversations.

pub mod config;
pub mod conversations;
pub mod presence;
pub mod reactions;
pub mod receipts;
pub mod typing;
pub mod views;

mod error;

pub use config::SyncConfig;
pub use conversations::{ConversationListWatch, ConversationSynchronizer};
pub use error::SyncError;
pub use presence::{LifecycleEvent, PresenceManager, PresenceView, PresenceWatch};
pub use reactions::ReactionToggle;
pub use receipts::ReadReceiptBatcher;
pub use typing::{TypingController, TypingWatch};
pub use views::{DayGroup, LocalDelivery, TimelineEntry};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise tracing for an embedding shell. Call once at startup;
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("courier_sync=debug,courier_store=info,courier_call=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
