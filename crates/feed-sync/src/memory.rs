//! In-memory feed store for tests and local development.
//!
//! Behaves like the durable store the feed is written against: IDs are
//! `m1`, `m2`, ... in append order, timestamps are strictly increasing, and
//! every change is broadcast to subscribers as a full snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use feed_config_and_utils::{FeedConfig, DEFAULT_SNAPSHOT_BUFFER};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::{FeedStore, SnapshotStream, StoreError, StoreResult};
use crate::types::{
    AppendAck, FeedSnapshot, MessageId, NewRecord, Principal, ServerTimestamp, StoreRecord,
    TempId,
};

type SnapshotSender = mpsc::Sender<StoreResult<FeedSnapshot>>;

/// Fans snapshots out to every open subscription.
#[derive(Debug, Default)]
struct SnapshotHub {
    subscribers: RwLock<Vec<SnapshotSender>>,
}

impl SnapshotHub {
    fn subscribe(&self, buffer: usize, initial: FeedSnapshot) -> mpsc::Receiver<StoreResult<FeedSnapshot>> {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        // Fresh channel with capacity >= 1, so the initial send cannot fail.
        let _ = sender.try_send(Ok(initial));
        self.subscribers.write().push(sender);
        receiver
    }

    /// Sends `item` to every subscriber. Subscribers that dropped their
    /// stream or fell a full buffer behind are removed.
    fn notify(&self, item: StoreResult<FeedSnapshot>) {
        self.subscribers.write().retain(|sender| match sender.try_send(item.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dropping snapshot subscriber that fell behind");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn close_all(&self) {
        self.subscribers.write().clear();
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[derive(Debug, Default)]
struct Failures {
    next_append: Option<StoreError>,
    next_delete: Option<StoreError>,
    next_subscribe: Option<StoreError>,
    deny_deletes: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<StoreRecord>,
    next_id: u64,
    last_timestamp: Option<ServerTimestamp>,
    holding: bool,
    failures: Failures,
    subscriptions: Vec<(String, String)>,
}

impl StoreState {
    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot::new(self.records.clone())
    }

    fn next_timestamp(&mut self) -> ServerTimestamp {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    fn insert(&mut self, record: NewRecord, client_ref: Option<TempId>) -> AppendAck {
        self.next_id += 1;
        let ack = AppendAck {
            id: MessageId::from(format!("m{}", self.next_id)),
            timestamp: self.next_timestamp(),
        };
        self.records.push(StoreRecord {
            id: ack.id.clone(),
            author_id: record.author_id,
            author_name: record.author_name,
            author_avatar_url: record.author_avatar_url,
            text: record.text,
            timestamp: ack.timestamp,
            client_ref,
        });
        ack
    }
}

/// An in-memory [`FeedStore`] with failure injection and call counters.
#[derive(Debug)]
pub struct InMemoryFeedStore {
    state: Mutex<StoreState>,
    hub: SnapshotHub,
    buffer: usize,
    append_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl InMemoryFeedStore {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SNAPSHOT_BUFFER)
    }

    /// Creates a store whose subscribers buffer at most `buffer` snapshots.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            hub: SnapshotHub::default(),
            buffer,
            append_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::with_buffer(config.snapshot_buffer)
    }

    fn broadcast(&self, state: &StoreState) {
        if state.holding {
            return;
        }
        self.hub.notify(Ok(state.snapshot()));
    }

    /// Appends a record as another client would: no `clientRef`, no call
    /// counted.
    pub fn append_as(&self, author: &Principal, text: impl Into<String>) -> AppendAck {
        let mut state = self.state.lock();
        let record = NewRecord::new(author, text, TempId::new());
        let ack = state.insert(record, None);
        self.broadcast(&state);
        ack
    }

    /// Removes a record as another client would. Returns whether it existed.
    pub fn remove(&self, id: &MessageId) -> bool {
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|r| &r.id != id);
        let removed = state.records.len() != before;
        if removed {
            self.broadcast(&state);
        }
        removed
    }

    /// Stops broadcasting changes until [`release`](Self::release).
    pub fn hold(&self) {
        self.state.lock().holding = true;
    }

    /// Resumes broadcasting and sends the current snapshot.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.holding = false;
        self.broadcast(&state);
    }

    /// Sends `snapshot` to subscribers without changing stored records.
    pub fn inject(&self, snapshot: FeedSnapshot) {
        self.hub.notify(Ok(snapshot));
    }

    /// Sends a transport failure to subscribers.
    pub fn inject_error(&self, err: StoreError) {
        self.hub.notify(Err(err));
    }

    /// Ends every open change stream.
    pub fn close_subscribers(&self) {
        self.hub.close_all();
    }

    pub fn fail_next_append(&self, err: StoreError) {
        self.state.lock().failures.next_append = Some(err);
    }

    pub fn fail_next_delete(&self, err: StoreError) {
        self.state.lock().failures.next_delete = Some(err);
    }

    pub fn fail_next_subscribe(&self, err: StoreError) {
        self.state.lock().failures.next_subscribe = Some(err);
    }

    /// Makes every delete fail with `PermissionDenied`, like a store whose
    /// access rules forbid it.
    pub fn deny_deletes(&self, deny: bool) {
        self.state.lock().failures.deny_deletes = deny;
    }

    pub fn records(&self) -> Vec<StoreRecord> {
        self.state.lock().records.clone()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.lock().snapshot()
    }

    /// `(collection_key, order_field)` of every subscription request.
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.state.lock().subscriptions.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Total store calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.append_calls() + self.delete_calls() + self.subscribe_calls()
    }
}

impl Default for InMemoryFeedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    async fn subscribe_ordered(
        &self,
        collection_key: &str,
        order_field: &str,
    ) -> StoreResult<SnapshotStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state
            .subscriptions
            .push((collection_key.to_string(), order_field.to_string()));
        if let Some(err) = state.failures.next_subscribe.take() {
            return Err(err);
        }

        let receiver = self.hub.subscribe(self.buffer, state.snapshot());
        debug!(collection = collection_key, "opened snapshot stream");

        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(stream.boxed())
    }

    async fn append(&self, record: NewRecord) -> StoreResult<AppendAck> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(err) = state.failures.next_append.take() {
            return Err(err);
        }
        let client_ref = Some(record.client_ref.clone());
        let ack = state.insert(record, client_ref);
        self.broadcast(&state);
        Ok(ack)
    }

    async fn delete(&self, id: &MessageId) -> StoreResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(err) = state.failures.next_delete.take() {
            return Err(err);
        }
        if state.failures.deny_deletes {
            return Err(StoreError::PermissionDenied(format!("delete of {id}")));
        }
        let before = state.records.len();
        state.records.retain(|r| &r.id != id);
        if state.records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.broadcast(&state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Principal {
        Principal::new("u1", "Ada", "https://img/ada.png")
    }

    #[tokio::test]
    async fn ids_and_timestamps_are_monotonic() {
        let store = InMemoryFeedStore::new();
        let first = store.append_as(&ada(), "one");
        let second = store.append_as(&ada(), "two");

        assert_eq!(first.id.as_str(), "m1");
        assert_eq!(second.id.as_str(), "m2");
        assert!(second.timestamp > first.timestamp);
    }

    #[tokio::test]
    async fn append_echoes_client_ref() {
        let store = InMemoryFeedStore::new();
        let temp_id = TempId::new();
        store
            .append(NewRecord::new(&ada(), "hello", temp_id.clone()))
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records[0].client_ref, Some(temp_id));
        assert_eq!(store.append_calls(), 1);
    }

    #[tokio::test]
    async fn subscribe_sends_current_snapshot_first() {
        let store = InMemoryFeedStore::new();
        store.append_as(&ada(), "existing");

        let mut stream = store.subscribe_ordered("messages", "timestamp").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.append_as(&ada(), "next");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(
            store.subscriptions(),
            vec![("messages".to_string(), "timestamp".to_string())]
        );
    }

    #[tokio::test]
    async fn held_changes_are_sent_on_release() {
        let store = InMemoryFeedStore::new();
        let mut stream = store.subscribe_ordered("messages", "timestamp").await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_empty());

        store.hold();
        store.append_as(&ada(), "one");
        store.append_as(&ada(), "two");
        store.release();

        let snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn denied_delete_keeps_record() {
        let store = InMemoryFeedStore::new();
        let ack = store.append_as(&ada(), "keep me");
        store.deny_deletes(true);

        let err = store.delete(&ack.id).await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_not_found() {
        let store = InMemoryFeedStore::new();
        let err = store.delete(&MessageId::from("m9")).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound(MessageId::from("m9")));
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped() {
        let store = InMemoryFeedStore::with_buffer(1);
        let _stream = store.subscribe_ordered("messages", "timestamp").await.unwrap();
        assert_eq!(store.subscriber_count(), 1);

        // The initial snapshot fills the buffer.
        store.append_as(&ada(), "overflow");
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn buffer_size_comes_from_config() {
        let config = FeedConfig {
            snapshot_buffer: 1,
            ..FeedConfig::default()
        };
        let store = InMemoryFeedStore::from_config(&config);
        let _stream = store.subscribe_ordered("messages", "timestamp").await.unwrap();

        store.append_as(&ada(), "overflow");
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closing_subscribers_ends_streams() {
        let store = InMemoryFeedStore::new();
        let mut stream = store.subscribe_ordered("messages", "timestamp").await.unwrap();
        stream.next().await.unwrap().unwrap();

        store.close_subscribers();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = InMemoryFeedStore::new();
        store.fail_next_append(StoreError::Transport("offline".to_string()));

        let record = NewRecord::new(&ada(), "one", TempId::new());
        assert!(store.append(record.clone()).await.is_err());
        assert!(store.append(record).await.is_ok());
    }
}
