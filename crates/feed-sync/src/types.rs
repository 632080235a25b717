//! Core types for the feed synchronizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned, monotonic creation time of a stored message.
pub type ServerTimestamp = DateTime<Utc>;

/// Store-assigned identifier of a message. Never reused.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Creates a message ID from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the message ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Locally generated identifier of a message that the store has not
/// acknowledged yet.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(pub String);

impl TempId {
    /// Creates a new random temporary ID (`local-<uuid>`).
    pub fn new() -> Self {
        Self(format!("local-{}", Uuid::new_v4()))
    }

    /// Creates a temporary ID from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the temporary ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authenticated identity of the current user.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl Principal {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
        }
    }
}

/// Delivery state of a message in the feed view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MessageState {
    /// Inserted optimistically; the store has not acknowledged it.
    Pending { temp_id: TempId, sequence: u64 },
    /// Known to the store.
    Confirmed {
        id: MessageId,
        created_at: ServerTimestamp,
    },
}

impl MessageState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MessageState::Pending { .. })
    }

    /// Returns the store ID for confirmed messages.
    pub fn confirmed_id(&self) -> Option<&MessageId> {
        match self {
            MessageState::Confirmed { id, .. } => Some(id),
            MessageState::Pending { .. } => None,
        }
    }

    /// Returns the temporary ID for pending messages.
    pub fn temp_id(&self) -> Option<&TempId> {
        match self {
            MessageState::Pending { temp_id, .. } => Some(temp_id),
            MessageState::Confirmed { .. } => None,
        }
    }
}

/// A message as shown in the feed view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub author_id: String,
    pub author_name: String,
    pub author_avatar_url: String,
    pub text: String,
    pub state: MessageState,
}

impl Message {
    /// Builds a confirmed message from a stored record.
    pub fn from_record(record: &StoreRecord) -> Self {
        Self {
            author_id: record.author_id.clone(),
            author_name: record.author_name.clone(),
            author_avatar_url: record.author_avatar_url.clone(),
            text: record.text.clone(),
            state: MessageState::Confirmed {
                id: record.id.clone(),
                created_at: record.timestamp,
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    pub fn confirmed_id(&self) -> Option<&MessageId> {
        self.state.confirmed_id()
    }

    pub fn created_at(&self) -> Option<ServerTimestamp> {
        match &self.state {
            MessageState::Confirmed { created_at, .. } => Some(*created_at),
            MessageState::Pending { .. } => None,
        }
    }

    pub fn is_authored_by(&self, principal: &Principal) -> bool {
        self.author_id == principal.id
    }
}

/// A document in the message collection, as delivered in a snapshot.
///
/// Field names match the stored document layout.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: MessageId,
    #[serde(rename = "uid")]
    pub author_id: String,
    #[serde(rename = "displayName")]
    pub author_name: String,
    #[serde(rename = "photoURL")]
    pub author_avatar_url: String,
    pub text: String,
    pub timestamp: ServerTimestamp,
    /// Temporary ID the record was appended with, echoed back by stores
    /// that support it.
    #[serde(rename = "clientRef", default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<TempId>,
}

/// A record to append. The store assigns `id` and `timestamp`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(rename = "uid")]
    pub author_id: String,
    #[serde(rename = "displayName")]
    pub author_name: String,
    #[serde(rename = "photoURL")]
    pub author_avatar_url: String,
    pub text: String,
    #[serde(rename = "clientRef")]
    pub client_ref: TempId,
}

impl NewRecord {
    pub fn new(author: &Principal, text: impl Into<String>, client_ref: TempId) -> Self {
        Self {
            author_id: author.id.clone(),
            author_name: author.display_name.clone(),
            author_avatar_url: author.avatar_url.clone(),
            text: text.into(),
            client_ref,
        }
    }
}

/// Store acknowledgment of an append.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AppendAck {
    pub id: MessageId,
    pub timestamp: ServerTimestamp,
}

/// A complete, ordered listing of the message collection.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    records: Vec<StoreRecord>,
}

impl FeedSnapshot {
    pub fn new(records: Vec<StoreRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[StoreRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.records.iter().any(|r| &r.id == id)
    }

    pub fn contains_client_ref(&self, temp_id: &TempId) -> bool {
        self.records
            .iter()
            .any(|r| r.client_ref.as_ref() == Some(temp_id))
    }

    /// Largest timestamp in the snapshot.
    pub fn high_water(&self) -> Option<ServerTimestamp> {
        self.records.iter().map(|r| r.timestamp).max()
    }
}
