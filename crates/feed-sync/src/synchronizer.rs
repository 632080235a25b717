//! The feed synchronizer.
//!
//! # Design Principles
//!
//! - The store's snapshot is the only source of confirmed messages
//! - Local entries survive only until a snapshot supersedes them
//! - Every change rebuilds the view and emits it under the state lock
//! - `unsubscribe` is a hard barrier: nothing is delivered after it returns

use std::sync::Arc;

use feed_config_and_utils::FeedConfig;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{FeedError, FeedResult};
use crate::event::{FeedEvent, FeedEventSink};
use crate::reconcile::{self, LocalEntry};
use crate::store::{FeedStore, SnapshotStream, StoreError, StoreResult};
use crate::types::{AppendAck, FeedSnapshot, Message, MessageId, Principal, TempId};
use crate::view::FeedView;

/// Identifies one live subscription. Deliveries tagged with an older
/// subscription are discarded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Mutable feed state. Only ever touched under `FeedShared::state`.
#[derive(Debug, Default)]
pub(crate) struct FeedState {
    confirmed: Vec<Message>,
    snapshot: Option<FeedSnapshot>,
    locals: Vec<LocalEntry>,
    view: FeedView,
    next_sequence: u64,
    epoch: u64,
    subscribed: bool,
    closed: bool,
}

impl FeedState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn view(&self) -> FeedView {
        self.view.clone()
    }

    pub(crate) fn local_count(&self) -> usize {
        self.locals.len()
    }

    fn rebuild(&mut self) -> FeedView {
        self.view = FeedView::new(reconcile::merge(&self.confirmed, &self.locals));
        self.view.clone()
    }

    /// Replaces the confirmed list with `snapshot` and prunes superseded
    /// local entries.
    pub(crate) fn apply_snapshot(&mut self, snapshot: FeedSnapshot) -> FeedView {
        self.confirmed = reconcile::confirmed_from_snapshot(&snapshot);
        let pruned = reconcile::prune_superseded(&mut self.locals, &snapshot);
        debug!(
            records = snapshot.len(),
            pruned,
            remaining_local = self.locals.len(),
            "applied feed snapshot"
        );
        self.snapshot = Some(snapshot);
        self.rebuild()
    }

    /// Inserts an optimistic entry and returns its temporary ID.
    pub(crate) fn insert_pending(&mut self, author: &Principal, text: String) -> (TempId, FeedView) {
        let temp_id = TempId::new();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.locals
            .push(LocalEntry::new(temp_id.clone(), sequence, author.clone(), text));
        (temp_id, self.rebuild())
    }

    /// Records the store's acknowledgment of a pending entry.
    ///
    /// Returns `None` when the entry no longer exists, either because a
    /// snapshot superseded it first or because the state was cleared.
    pub(crate) fn acknowledge(&mut self, temp_id: &TempId, ack: AppendAck) -> Option<FeedView> {
        let index = self.locals.iter().position(|e| &e.temp_id == temp_id)?;

        let already_confirmed = self
            .confirmed
            .iter()
            .any(|m| m.confirmed_id() == Some(&ack.id));
        if already_confirmed {
            self.locals.remove(index);
            return Some(self.rebuild());
        }

        self.locals[index].ack = Some(ack);
        if let Some(snapshot) = &self.snapshot {
            if self.locals[index].is_superseded_by(snapshot) {
                self.locals.remove(index);
            }
        }
        Some(self.rebuild())
    }

    /// Removes a pending entry after its append failed.
    pub(crate) fn roll_back(&mut self, temp_id: &TempId) -> Option<FeedView> {
        let index = self
            .locals
            .iter()
            .position(|e| &e.temp_id == temp_id && e.ack.is_none())?;
        self.locals.remove(index);
        Some(self.rebuild())
    }

    /// Drops acknowledged local copies of a message deleted from the store.
    pub(crate) fn forget_acknowledged(&mut self, id: &MessageId) -> Option<FeedView> {
        let before = self.locals.len();
        self.locals
            .retain(|e| e.ack.as_ref().map(|ack| &ack.id) != Some(id));
        if self.locals.len() == before {
            return None;
        }
        Some(self.rebuild())
    }

    /// Discards confirmed messages and local entries.
    pub(crate) fn clear(&mut self) -> FeedView {
        self.confirmed.clear();
        self.locals.clear();
        self.snapshot = None;
        self.rebuild()
    }

    fn is_current(&self, subscription: SubscriptionId) -> bool {
        self.subscribed && !self.closed && self.epoch == subscription.0
    }
}

/// State shared by the synchronizer, its pump task and its dispatchers.
pub(crate) struct FeedShared {
    state: Mutex<FeedState>,
    sink: Arc<dyn FeedEventSink>,
}

impl FeedShared {
    fn new(sink: Arc<dyn FeedEventSink>) -> Self {
        Self {
            state: Mutex::new(FeedState::new()),
            sink,
        }
    }

    pub(crate) fn view(&self) -> FeedView {
        self.state.lock().view()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn emit(&self, event: FeedEvent) {
        self.sink.emit(event);
    }

    /// Applies one item from the change stream. Returns whether the pump
    /// should keep reading.
    fn deliver(&self, subscription: SubscriptionId, item: StoreResult<FeedSnapshot>) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(subscription) {
            debug!(subscription = subscription.0, "discarding stale delivery");
            return false;
        }

        match item {
            Ok(snapshot) => {
                let view = state.apply_snapshot(snapshot);
                self.sink.emit(FeedEvent::ViewChanged(view));
                true
            }
            Err(err) => {
                state.subscribed = false;
                warn!(error = %err, "feed sync interrupted");
                self.sink.emit(FeedEvent::SyncInterrupted {
                    reason: err.to_string(),
                });
                false
            }
        }
    }

    /// Marks the subscription inactive and reports the condition, unless the
    /// subscription was already cancelled.
    fn interrupt(&self, subscription: SubscriptionId, err: &StoreError) {
        let mut state = self.state.lock();
        if !state.is_current(subscription) {
            return;
        }
        state.subscribed = false;
        warn!(error = %err, "feed sync interrupted");
        self.sink.emit(FeedEvent::SyncInterrupted {
            reason: err.to_string(),
        });
    }

    pub(crate) fn insert_pending(
        &self,
        author: &Principal,
        text: String,
    ) -> FeedResult<TempId> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FeedError::SessionClosed);
        }
        let (temp_id, view) = state.insert_pending(author, text);
        self.sink.emit(FeedEvent::ViewChanged(view));
        Ok(temp_id)
    }

    pub(crate) fn acknowledge(&self, temp_id: &TempId, ack: AppendAck) {
        let mut state = self.state.lock();
        if state.closed {
            debug!(temp_id = %temp_id, "ignoring acknowledgment after close");
            return;
        }
        match state.acknowledge(temp_id, ack) {
            Some(view) => self.sink.emit(FeedEvent::ViewChanged(view)),
            None => debug!(temp_id = %temp_id, "acknowledged entry already superseded"),
        }
    }

    pub(crate) fn roll_back(&self, temp_id: &TempId, text: String, err: &StoreError) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if let Some(view) = state.roll_back(temp_id) {
            self.sink.emit(FeedEvent::ViewChanged(view));
        }
        warn!(temp_id = %temp_id, error = %err, "dispatch failed");
        self.sink.emit(FeedEvent::DispatchFailed {
            temp_id: temp_id.clone(),
            text,
            reason: err.to_string(),
        });
    }

    pub(crate) fn forget_acknowledged(&self, id: &MessageId) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if let Some(view) = state.forget_acknowledged(id) {
            self.sink.emit(FeedEvent::ViewChanged(view));
        }
    }

    fn is_current(&self, subscription: SubscriptionId) -> bool {
        self.state.lock().is_current(subscription)
    }
}

/// Keeps an ordered feed view in sync with the durable store.
pub struct FeedSynchronizer {
    shared: Arc<FeedShared>,
    store: Arc<dyn FeedStore>,
    config: FeedConfig,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl FeedSynchronizer {
    pub fn new(
        store: Arc<dyn FeedStore>,
        sink: Arc<dyn FeedEventSink>,
        config: FeedConfig,
    ) -> Self {
        Self {
            shared: Arc::new(FeedShared::new(sink)),
            store,
            config,
            pump: Mutex::new(None),
        }
    }

    /// Opens the live subscription and starts applying snapshots.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn subscribe(&self) -> FeedResult<SubscriptionId> {
        let subscription = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(FeedError::SessionClosed);
            }
            if state.subscribed {
                return Err(FeedError::AlreadySubscribed);
            }
            state.epoch += 1;
            state.subscribed = true;
            SubscriptionId(state.epoch)
        };

        let stream = match self
            .store
            .subscribe_ordered(&self.config.collection_key, &self.config.order_field)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                self.shared.interrupt(subscription, &err);
                return Err(FeedError::SyncInterrupted(err));
            }
        };

        let handle = tokio::spawn(pump(Arc::clone(&self.shared), subscription, stream));

        let mut pump_slot = self.pump.lock();
        if !self.shared.is_current(subscription) {
            handle.abort();
            return Err(FeedError::SubscriptionCancelled);
        }
        if let Some(previous) = pump_slot.replace(handle) {
            previous.abort();
        }

        info!(
            subscription = subscription.0,
            collection = %self.config.collection_key,
            order_field = %self.config.order_field,
            "feed subscribed"
        );
        Ok(subscription)
    }

    /// Cancels the live subscription. Returns whether one was active.
    ///
    /// No event for the cancelled subscription is emitted after this returns.
    pub fn unsubscribe(&self) -> bool {
        let was_subscribed = {
            let mut state = self.shared.state.lock();
            let was_subscribed = state.subscribed;
            state.subscribed = false;
            state.epoch += 1;
            was_subscribed
        };

        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }

        if was_subscribed {
            info!("feed unsubscribed");
        }
        was_subscribed
    }

    /// Unsubscribes and discards all feed state. Emits a final empty view.
    ///
    /// Later acknowledgments and dispatches against this feed are ignored.
    pub fn close(&self) {
        self.unsubscribe();

        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        let view = state.clear();
        state.closed = true;
        self.shared.sink.emit(FeedEvent::ViewChanged(view));
    }

    pub fn view(&self) -> FeedView {
        self.shared.view()
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.state.lock().subscribed
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of local entries not yet reflected by a snapshot.
    pub fn local_count(&self) -> usize {
        self.shared.state.lock().local_count()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Creates a dispatcher that writes through this feed for `principal`.
    pub fn dispatcher(&self, principal: Principal) -> Dispatcher {
        Dispatcher::new(principal, Arc::clone(&self.store), Arc::clone(&self.shared))
    }

    #[cfg(test)]
    pub(crate) fn deliver_for_test(
        &self,
        subscription: SubscriptionId,
        item: StoreResult<FeedSnapshot>,
    ) -> bool {
        self.shared.deliver(subscription, item)
    }
}

impl Drop for FeedSynchronizer {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.get_mut().take() {
            handle.abort();
        }
    }
}

async fn pump(shared: Arc<FeedShared>, subscription: SubscriptionId, mut stream: SnapshotStream) {
    while let Some(item) = stream.next().await {
        if !shared.deliver(subscription, item) {
            return;
        }
    }
    shared.interrupt(subscription, &StoreError::StreamClosed);
}
