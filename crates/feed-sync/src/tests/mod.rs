//! Integration tests for the feed synchronizer.
//!
//! Test organization follows the feed rules:
//!
//! - `ordering.rs`     - Rules 1-10 (Ordering & Reconciliation)
//! - `dispatch.rs`     - Rules 11-20 (Compose & Dispatch)
//! - `cancellation.rs` - Rules 21-26 (Subscription Lifecycle & Cancellation)
//! - `properties.rs`   - Rules 27-29 (Randomized Interleavings)


use std::sync::Arc;

use chrono::DateTime;
use feed_config_and_utils::FeedConfig;

use crate::event::{FeedEvent, RecordingSink};
use crate::memory::InMemoryFeedStore;
use crate::synchronizer::FeedSynchronizer;
use crate::types::{MessageId, Principal, ServerTimestamp, StoreRecord, TempId};
use crate::SubmitOutcome;

pub(crate) fn ada() -> Principal {
    Principal::new("u1", "Ada", "https://img/ada.png")
}

pub(crate) fn grace() -> Principal {
    Principal::new("u2", "Grace", "https://img/grace.png")
}

pub(crate) fn at(ms: i64) -> ServerTimestamp {
    DateTime::from_timestamp_millis(ms).unwrap()
}

pub(crate) fn record(id: &str, ms: i64, author: &Principal, text: &str) -> StoreRecord {
    StoreRecord {
        id: MessageId::from(id),
        author_id: author.id.clone(),
        author_name: author.display_name.clone(),
        author_avatar_url: author.avatar_url.clone(),
        text: text.to_string(),
        timestamp: at(ms),
        client_ref: None,
    }
}

pub(crate) fn echoed(id: &str, ms: i64, author: &Principal, text: &str, temp_id: &TempId) -> StoreRecord {
    StoreRecord {
        client_ref: Some(temp_id.clone()),
        ..record(id, ms, author, text)
    }
}

/// A subscribed feed over an in-memory store.
pub(crate) struct Harness {
    pub store: Arc<InMemoryFeedStore>,
    pub sink: Arc<RecordingSink>,
    pub feed: FeedSynchronizer,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryFeedStore::new());
        let sink = Arc::new(RecordingSink::new());
        let feed = FeedSynchronizer::new(store.clone(), sink.clone(), FeedConfig::default());
        Self { store, sink, feed }
    }

    pub async fn subscribed() -> Self {
        let harness = Self::new();
        harness.feed.subscribe().await.unwrap();
        settle().await;
        harness
    }
}

/// Lets spawned pump tasks drain their channels.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Basic workflow test demonstrating core functionality.
#[tokio::test]
async fn basic_workflow() {
    let h = Harness::subscribed().await;
    assert!(h.feed.is_subscribed());
    assert!(h.feed.view().is_empty());

    // Another client writes
    h.store.append_as(&grace(), "hi all");
    settle().await;
    assert_eq!(h.feed.view().len(), 1);

    // We write
    let dispatcher = h.feed.dispatcher(ada());
    dispatcher.set_draft("  hello  ");
    let outcome = dispatcher.submit().await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Acknowledged { .. }));
    assert_eq!(dispatcher.draft(), "");
    settle().await;

    let view = h.feed.view();
    assert_eq!(view.len(), 2);
    assert_eq!(view.pending_count(), 0);
    assert_eq!(view.messages()[1].text, "hello");
    assert_eq!(h.feed.local_count(), 0);

    // Every change was emitted as a whole view
    assert!(h.sink.events().iter().all(|e| matches!(e, FeedEvent::ViewChanged(_))));
    assert_eq!(h.sink.last_view(), Some(view));

    h.feed.close();
    assert!(h.feed.view().is_empty());
    assert!(h.feed.is_closed());
}
