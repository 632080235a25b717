//! Durable feed store contract.
//!
//! The store is an external collaborator: an ID-indexed message collection
//! with server-assigned monotonic timestamps that delivers complete ordered
//! snapshots on every change.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::types::{AppendAck, FeedSnapshot, MessageId, NewRecord};

/// Errors reported by a feed store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or backend failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store's access rules rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The addressed record does not exist.
    #[error("record not found: {0}")]
    NotFound(MessageId),

    /// The change stream ended.
    #[error("change stream closed")]
    StreamClosed,
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Live stream of full snapshots, in store emission order.
pub type SnapshotStream = BoxStream<'static, StoreResult<FeedSnapshot>>;

/// Client of the durable feed store.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Opens a live subscription to `collection_key` ordered by `order_field`
    /// ascending. The first item is the current snapshot.
    async fn subscribe_ordered(
        &self,
        collection_key: &str,
        order_field: &str,
    ) -> StoreResult<SnapshotStream>;

    /// Appends a record; the store assigns ID and timestamp.
    async fn append(&self, record: NewRecord) -> StoreResult<AppendAck>;

    /// Deletes a record by ID.
    async fn delete(&self, id: &MessageId) -> StoreResult<()>;
}
