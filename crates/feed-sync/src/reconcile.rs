//! Pure reconciliation of store snapshots with local optimistic entries.
//!
//! ```text
//! snapshot ──► confirmed (sorted by created_at, id)
//!                   │
//! locals ──prune──► surviving acknowledged ──┐
//!                   surviving pending ───────┤
//!                                            ▼
//!           [confirmed ∪ acknowledged sorted] ++ [pending by sequence]
//! ```
//!
//! A local entry is superseded, and dropped, when the snapshot carries its
//! temporary ID as `clientRef`, or carries its acknowledged ID, or has moved
//! strictly past its acknowledged timestamp without it (the record was
//! tombstoned).

use std::collections::HashSet;

use crate::types::{
    AppendAck, FeedSnapshot, Message, MessageId, MessageState, Principal, ServerTimestamp, TempId,
};

/// A message submitted from this client that no snapshot has reflected yet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalEntry {
    pub temp_id: TempId,
    pub sequence: u64,
    pub author: Principal,
    pub text: String,
    /// Set once the store acknowledges the append.
    pub ack: Option<AppendAck>,
}

impl LocalEntry {
    pub fn new(temp_id: TempId, sequence: u64, author: Principal, text: String) -> Self {
        Self {
            temp_id,
            sequence,
            author,
            text,
            ack: None,
        }
    }

    pub fn to_message(&self) -> Message {
        let state = match &self.ack {
            Some(ack) => MessageState::Confirmed {
                id: ack.id.clone(),
                created_at: ack.timestamp,
            },
            None => MessageState::Pending {
                temp_id: self.temp_id.clone(),
                sequence: self.sequence,
            },
        };
        Message {
            author_id: self.author.id.clone(),
            author_name: self.author.display_name.clone(),
            author_avatar_url: self.author.avatar_url.clone(),
            text: self.text.clone(),
            state,
        }
    }

    /// Whether `snapshot` makes this entry redundant.
    pub fn is_superseded_by(&self, snapshot: &FeedSnapshot) -> bool {
        if snapshot.contains_client_ref(&self.temp_id) {
            return true;
        }
        match &self.ack {
            None => false,
            Some(ack) => {
                snapshot.contains(&ack.id)
                    || snapshot
                        .high_water()
                        // Other records may share the ack's timestamp
                        .is_some_and(|high_water| high_water > ack.timestamp)
            }
        }
    }
}

/// Ordering key for confirmed messages.
fn confirmed_key(message: &Message) -> Option<(ServerTimestamp, &MessageId)> {
    match &message.state {
        MessageState::Confirmed { id, created_at } => Some((*created_at, id)),
        MessageState::Pending { .. } => None,
    }
}

/// Converts a snapshot into confirmed messages ordered by `(created_at, id)`.
pub fn confirmed_from_snapshot(snapshot: &FeedSnapshot) -> Vec<Message> {
    let mut confirmed: Vec<Message> = snapshot.records().iter().map(Message::from_record).collect();
    confirmed.sort_by(|a, b| confirmed_key(a).cmp(&confirmed_key(b)));

    let mut seen: HashSet<MessageId> = HashSet::new();
    confirmed.retain(|m| match m.confirmed_id() {
        Some(id) => seen.insert(id.clone()),
        None => true,
    });
    confirmed
}

/// Drops local entries superseded by `snapshot`. Returns how many were dropped.
pub fn prune_superseded(locals: &mut Vec<LocalEntry>, snapshot: &FeedSnapshot) -> usize {
    let before = locals.len();
    locals.retain(|entry| !entry.is_superseded_by(snapshot));
    before - locals.len()
}

/// Builds the feed order from confirmed messages and local entries.
///
/// No two messages in the result share a store ID; a confirmed message
/// always wins over a local copy.
pub fn merge(confirmed: &[Message], locals: &[LocalEntry]) -> Vec<Message> {
    let mut seen: HashSet<MessageId> = confirmed
        .iter()
        .filter_map(|m| m.confirmed_id().cloned())
        .collect();

    let mut settled: Vec<Message> = confirmed.to_vec();
    let mut pending: Vec<&LocalEntry> = Vec::new();

    for entry in locals {
        match &entry.ack {
            Some(ack) => {
                if seen.insert(ack.id.clone()) {
                    settled.push(entry.to_message());
                }
            }
            None => pending.push(entry),
        }
    }

    settled.sort_by(|a, b| confirmed_key(a).cmp(&confirmed_key(b)));
    pending.sort_by_key(|entry| entry.sequence);

    settled.extend(pending.into_iter().map(LocalEntry::to_message));
    settled
}
