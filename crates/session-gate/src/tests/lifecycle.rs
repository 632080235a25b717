//! Session lifecycle & isolation tests for the session gate.
//!
//! Rules covered:
//! - 1. Signing in starts a subscribed feed for the principal
//! - 2. Repeated notifications for the same principal change nothing
//! - 3. Signing out discards the view and pending messages
//! - 4. A new principal starts from the store alone
//! - 5. Switching principals closes the previous session's dispatcher
//! - 6. No store calls happen while signed out
//! - 7. The provider ending the session tears the feed down
//! - 8. A restored session activates without a sign-in

use std::sync::Arc;

use async_trait::async_trait;
use feed_config_and_utils::FeedConfig;
use feed_sync::{
    AppendAck, FeedError, FeedStore, InMemoryFeedStore, MessageId, NewRecord, RecordingSink,
    SnapshotStream, StoreResult, SubmitOutcome,
};
use tokio::sync::Notify;

use super::{ada, grace, settle, Harness};
use crate::memory::InMemoryIdentity;
use crate::{SessionGate, SessionPhase};

/// Rule 1: Signing in starts a subscribed feed for the principal
#[tokio::test]
async fn rule_01_sign_in_starts_feed() {
    let h = Harness::signed_in(ada()).await;

    let session = h.gate.session();
    assert_eq!(session.principal, Some(ada()));
    assert_eq!(session.phase, SessionPhase::Active);
    assert!(h.gate.is_syncing());
    assert_eq!(
        h.store.subscriptions(),
        vec![("messages".to_string(), "timestamp".to_string())]
    );
    assert_eq!(h.gate.dispatcher().unwrap().principal(), &ada());
}

/// Rule 2: Repeated notifications for the same principal change nothing
#[tokio::test]
async fn rule_02_repeated_notification_is_idempotent() {
    let h = Harness::signed_in(ada()).await;
    let dispatcher = h.gate.dispatcher().unwrap();

    h.gate.on_session_change(Some(ada())).await.unwrap();
    h.gate.on_session_change(Some(ada())).await.unwrap();

    assert_eq!(h.store.subscribe_calls(), 1);
    assert_eq!(h.session_changes(), vec![Some(ada())]);
    assert!(Arc::ptr_eq(&dispatcher, &h.gate.dispatcher().unwrap()));
}

/// Holds every append until released.
struct SlowAppendStore {
    inner: InMemoryFeedStore,
    gate: Notify,
}

#[async_trait]
impl FeedStore for SlowAppendStore {
    async fn subscribe_ordered(
        &self,
        collection_key: &str,
        order_field: &str,
    ) -> StoreResult<SnapshotStream> {
        self.inner.subscribe_ordered(collection_key, order_field).await
    }

    async fn append(&self, record: NewRecord) -> StoreResult<AppendAck> {
        self.gate.notified().await;
        self.inner.append(record).await
    }

    async fn delete(&self, id: &MessageId) -> StoreResult<()> {
        self.inner.delete(id).await
    }
}

/// Rules 3-4: Signing out discards pending messages; the next principal
/// starts from the store alone
#[tokio::test]
async fn rule_03_04_sign_out_discards_pending() {
    let identity = Arc::new(InMemoryIdentity::new());
    let store = Arc::new(SlowAppendStore {
        inner: InMemoryFeedStore::new(),
        gate: Notify::new(),
    });
    let sink = Arc::new(RecordingSink::new());
    let gate = SessionGate::new(identity.clone(), store.clone(), sink.clone(), FeedConfig::default());

    identity.script_sign_in(Ok(ada()));
    gate.sign_in().await.unwrap();
    settle().await;

    let dispatcher = gate.dispatcher().unwrap();
    dispatcher.set_draft("in flight");
    let submitting = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.submit().await })
    };
    settle().await;
    assert_eq!(gate.feed_view().pending_count(), 1);

    gate.sign_out().await.unwrap();
    assert!(gate.feed_view().is_empty());
    assert_eq!(sink.last_view().map(|v| v.len()), Some(0));

    // The store still answers the old request; nothing reaches the sink
    sink.clear();
    store.gate.notify_one();
    let outcome = submitting.await.unwrap().unwrap();
    assert!(matches!(outcome, SubmitOutcome::Acknowledged { .. }));
    settle().await;
    assert!(sink.is_empty());

    // The next principal sees only what the store holds
    identity.script_sign_in(Ok(grace()));
    gate.sign_in().await.unwrap();
    settle().await;
    let view = gate.feed_view();
    assert_eq!(view.pending_count(), 0);
    assert_eq!(view.len(), 1);
    assert_eq!(view.messages()[0].author_id, ada().id);
}

/// Rule 5: Switching principals closes the previous session's dispatcher
#[tokio::test]
async fn rule_05_switch_closes_previous_dispatcher() {
    let h = Harness::signed_in(ada()).await;
    let old = h.gate.dispatcher().unwrap();

    h.gate.on_session_change(Some(grace())).await.unwrap();
    settle().await;

    assert_eq!(h.gate.session().principal, Some(grace()));
    assert_eq!(h.gate.dispatcher().unwrap().principal(), &grace());
    assert_eq!(h.session_changes(), vec![Some(ada()), None, Some(grace())]);

    old.set_draft("from the past");
    assert_eq!(old.submit().await.unwrap_err(), FeedError::SessionClosed);
    assert_eq!(h.store.append_calls(), 0);
}

/// Rule 6: No store calls happen while signed out
#[tokio::test]
async fn rule_06_no_store_calls_while_signed_out() {
    let h = Harness::new();
    h.gate.on_session_change(None).await.unwrap();
    assert_eq!(h.store.total_calls(), 0);
    assert!(h.gate.dispatcher().is_none());

    h.identity.script_sign_in(Ok(ada()));
    h.gate.sign_in().await.unwrap();
    let dispatcher = h.gate.dispatcher().unwrap();
    h.gate.sign_out().await.unwrap();
    let calls = h.store.total_calls();

    dispatcher.set_draft("after sign-out");
    assert!(dispatcher.submit().await.is_err());
    assert_eq!(
        dispatcher.delete_own_message(&MessageId::from("m1")).await.unwrap_err(),
        FeedError::SessionClosed
    );
    assert_eq!(h.store.total_calls(), calls);
}

/// Rule 7: The provider ending the session tears the feed down
#[tokio::test]
async fn rule_07_provider_sign_out() {
    let h = Harness::signed_in(ada()).await;
    h.store.append_as(&grace(), "hello");
    settle().await;
    assert_eq!(h.gate.feed_view().len(), 1);

    h.gate.on_session_change(None).await.unwrap();

    assert_eq!(h.gate.session().phase, SessionPhase::SignedOut);
    assert!(h.gate.feed_view().is_empty());
    assert!(!h.gate.is_syncing());

    // The cancelled stream is released; the next change prunes it
    settle().await;
    h.store.append_as(&grace(), "unseen");
    assert_eq!(h.store.subscriber_count(), 0);
    assert!(h.gate.feed_view().is_empty());
}

/// Rule 8: A restored session activates without a sign-in
#[tokio::test]
async fn rule_08_restored_session_via_observer() {
    let h = Harness::new();
    h.identity.push(Some(ada()));

    let observer = h.gate.spawn_observer();
    settle().await;

    assert!(h.gate.session().is_active());
    assert!(h.gate.is_syncing());
    assert_eq!(h.identity.sign_in_calls(), 0);

    // At-least-once delivery
    h.identity.repeat();
    settle().await;
    assert_eq!(h.store.subscribe_calls(), 1);

    h.identity.push(None);
    settle().await;
    assert!(!h.gate.session().is_active());
    observer.stop();
}
