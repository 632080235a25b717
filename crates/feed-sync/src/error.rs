//! Feed error types.

use thiserror::Error;

use crate::event::ConditionKind;
use crate::store::StoreError;
use crate::types::MessageId;

/// Feed error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The change stream could not be opened, failed, or ended.
    #[error("sync interrupted: {0}")]
    SyncInterrupted(StoreError),

    /// The store rejected an append.
    #[error("dispatch failed: {0}")]
    DispatchFailed(StoreError),

    /// The store rejected a delete.
    #[error("delete of {id} rejected: {source}")]
    DeleteRejected { id: MessageId, source: StoreError },

    /// Delete attempted on a message authored by someone else.
    #[error("message {0} is not authored by the current principal")]
    NotAuthor(MessageId),

    /// Delete attempted on a message that is not in the feed view.
    #[error("message {0} is not in the feed")]
    MessageNotFound(MessageId),

    /// A live subscription is already open.
    #[error("feed is already subscribed")]
    AlreadySubscribed,

    /// `unsubscribe` raced with `subscribe` while the stream was opening.
    #[error("subscription cancelled while opening")]
    SubscriptionCancelled,

    /// The owning session has ended.
    #[error("session closed")]
    SessionClosed,
}

impl FeedError {
    /// Maps the error onto the condition taxonomy reported to the UI.
    pub fn condition(&self) -> Option<ConditionKind> {
        match self {
            FeedError::SyncInterrupted(_) => Some(ConditionKind::SyncInterrupted),
            FeedError::DispatchFailed(_) => Some(ConditionKind::DispatchFailed),
            FeedError::DeleteRejected { .. }
            | FeedError::NotAuthor(_)
            | FeedError::MessageNotFound(_) => Some(ConditionKind::DeleteRejected),
            FeedError::AlreadySubscribed
            | FeedError::SubscriptionCancelled
            | FeedError::SessionClosed => None,
        }
    }
}

/// Result type alias using FeedError.
pub type FeedResult<T> = Result<T, FeedError>;
