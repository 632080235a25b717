//! Feed events delivered to the presentational layer.
//!
//! # Design Principles
//!
//! - The core emits events; the sink decides what they mean
//! - Every view change is emitted as a whole view, never a delta
//! - Error conditions are typed events, never panics
//! - Nothing is emitted for a subscription after it is cancelled

use tokio::sync::mpsc;

use crate::types::{MessageId, Principal, TempId};
use crate::view::FeedView;

/// Non-fatal condition taxonomy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConditionKind {
    AuthFailed,
    SyncInterrupted,
    DispatchFailed,
    DeleteRejected,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::AuthFailed => "auth-failed",
            ConditionKind::SyncInterrupted => "sync-interrupted",
            ConditionKind::DispatchFailed => "dispatch-failed",
            ConditionKind::DeleteRejected => "delete-rejected",
        }
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted by the feed core.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    /// The feed view was rebuilt.
    ViewChanged(FeedView),
    /// The session's principal changed (`None` after sign-out).
    SessionChanged { principal: Option<Principal> },
    /// Sign-in was rejected or cancelled by the identity provider.
    AuthFailed { reason: String },
    /// The change stream failed or ended; the view stops updating.
    SyncInterrupted { reason: String },
    /// An append was rejected; the pending message was rolled back.
    DispatchFailed {
        temp_id: TempId,
        text: String,
        reason: String,
    },
    /// A delete was refused locally or by the store.
    DeleteRejected { id: MessageId, reason: String },
}

impl FeedEvent {
    /// The condition this event reports, if it is one.
    pub fn condition(&self) -> Option<ConditionKind> {
        match self {
            FeedEvent::AuthFailed { .. } => Some(ConditionKind::AuthFailed),
            FeedEvent::SyncInterrupted { .. } => Some(ConditionKind::SyncInterrupted),
            FeedEvent::DispatchFailed { .. } => Some(ConditionKind::DispatchFailed),
            FeedEvent::DeleteRejected { .. } => Some(ConditionKind::DeleteRejected),
            FeedEvent::ViewChanged(_) | FeedEvent::SessionChanged { .. } => None,
        }
    }
}

/// A sink that receives feed events.
///
/// `emit` is called while the feed state lock is held, so implementations
/// must not call back into the synchronizer or dispatcher.
pub trait FeedEventSink: Send + Sync {
    fn emit(&self, event: FeedEvent);
}

/// A no-op sink that discards all events.
#[derive(Debug, Default)]
pub struct NullSink;

impl FeedEventSink for NullSink {
    fn emit(&self, _event: FeedEvent) {}
}

/// A sink that records all events for testing.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: parking_lot::Mutex<Vec<FeedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events.
    pub fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().clone()
    }

    /// Returns the recorded views, oldest first.
    pub fn views(&self) -> Vec<FeedView> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FeedEvent::ViewChanged(view) => Some(view.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_view(&self) -> Option<FeedView> {
        self.views().pop()
    }

    /// Returns the recorded conditions, oldest first.
    pub fn conditions(&self) -> Vec<ConditionKind> {
        self.events
            .lock()
            .iter()
            .filter_map(FeedEvent::condition)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeedEventSink for RecordingSink {
    fn emit(&self, event: FeedEvent) {
        self.events.lock().push(event);
    }
}

/// A sink that forwards events to an unbounded channel, for consumers
/// running their own event loop.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<FeedEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl FeedEventSink for ChannelSink {
    fn emit(&self, event: FeedEvent) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}
