//! # Feed Sync
//!
//! Keeps an ordered chat feed in sync with a durable document store, with
//! optimistic local writes reconciled against the store's snapshots.
//!
//! ## Principles
//!
//! - **The store is the source of truth** - Confirmed messages come only from snapshots
//! - **Optimistic writes are local and temporary** - Pending messages never outlive a snapshot that carries them
//! - **Views are rebuilt, never mutated** - Every change produces a new `FeedView`
//! - **Conditions are events** - Failures surface as `FeedEvent`s, never panics
//!
//! ## Architecture
//!
//! ```text
//! WRITE:
//!   draft → pending (view) → store.append → acknowledged | rolled back
//!
//! READ:
//!   store snapshot → reconcile(confirmed, local) → view → sink
//!
//! CANCEL:
//!   unsubscribe → epoch bump → stale deliveries discarded
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use feed_sync::{FeedSynchronizer, InMemoryFeedStore, Principal, RecordingSink, SubmitOutcome};
//! use feed_config_and_utils::FeedConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(InMemoryFeedStore::new());
//! let sink = Arc::new(RecordingSink::new());
//! let feed = FeedSynchronizer::new(store.clone(), sink.clone(), FeedConfig::default());
//! feed.subscribe().await.unwrap();
//!
//! let dispatcher = feed.dispatcher(Principal::new("u1", "Ada", ""));
//! dispatcher.set_draft("hello");
//! let outcome = dispatcher.submit().await.unwrap();
//! assert!(matches!(outcome, SubmitOutcome::Acknowledged { .. }));
//! assert_eq!(feed.view().len(), 1);
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`types`] - Core types
//! - [`view`] - Immutable feed views
//! - [`store`] - Durable store contract
//! - [`reconcile`] - Snapshot/local merge
//! - [`synchronizer`] - The feed synchronizer
//! - [`dispatcher`] - Compose buffer and dispatcher
//! - [`event`] - Feed events and sinks
//! - [`memory`] - In-memory store

pub mod dispatcher;
mod error;
pub mod event;
pub mod memory;
pub mod reconcile;
pub mod store;
pub mod synchronizer;
pub mod types;
pub mod view;

#[cfg(test)]
mod tests;

pub use dispatcher::{ComposeBuffer, Dispatcher, SubmitOutcome};
pub use error::{FeedError, FeedResult};
pub use event::{ChannelSink, ConditionKind, FeedEvent, FeedEventSink, NullSink, RecordingSink};
pub use memory::InMemoryFeedStore;
pub use store::{FeedStore, SnapshotStream, StoreError, StoreResult};
pub use synchronizer::{FeedSynchronizer, SubscriptionId};
pub use types::{
    AppendAck, FeedSnapshot, Message, MessageId, MessageState, NewRecord, Principal,
    ServerTimestamp, StoreRecord, TempId,
};
pub use view::{Alignment, FeedView};
