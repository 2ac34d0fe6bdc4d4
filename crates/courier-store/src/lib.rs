//! # courier-store
//!
//! The remote-store boundary of the Courier core: the document and
//! field-operation model, the query model, the async [`StoreHandle`]
//! capability interface, and an in-process in-memory backend used by tests
//! and loopback embeddings. The wire protocol and storage engine behind a
//! production handle live outside this workspace.
//!
//! The store guarantees snapshot ordering per subscriber only; independent
//! writers' updates may be observed in any relative order. Fields shared by
//! several writers (unread counters, reaction sets) must therefore be
//! mutated exclusively through the atomic [`FieldOp`]s, never by
//! client-side read-modify-write.

pub mod document;
pub mod handle;
pub mod memory;
pub mod models;
pub mod ops;
pub mod paths;
pub mod query;

mod error;

pub use document::{to_fields, Document, Fields};
pub use error::StoreError;
pub use handle::{BatchWrite, Snapshot, StoreCommand, StoreHandle, Subscription, SubscriptionId};
pub use memory::spawn_memory_store;
pub use models::*;
pub use ops::{FieldOp, FieldPath};
pub use paths::DocPath;
pub use query::{Direction, Filter, Query, Scope};
