//! Immutable feed views.
//!
//! A view is rebuilt on every change and shared by reference count, so
//! consumers can hold on to an old view while newer ones are produced.

use std::sync::Arc;

use crate::types::{Message, MessageId, Principal, TempId};

/// Which side of the conversation a message belongs to, relative to the
/// current principal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Alignment {
    Own,
    Other,
}

/// An ordered, read-only sequence of messages.
#[derive(Clone, Debug, Default)]
pub struct FeedView {
    messages: Arc<Vec<Message>>,
}

impl FeedView {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(messages),
        }
    }

    /// Messages in feed order: confirmed by `(created_at, id)`, then pending
    /// by submission order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Looks up a confirmed message by its store ID.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.confirmed_id() == Some(id))
    }

    /// Looks up a pending message by its temporary ID.
    pub fn get_pending(&self, temp_id: &TempId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.state.temp_id() == Some(temp_id))
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    /// Store IDs of confirmed messages, in feed order.
    pub fn confirmed_ids(&self) -> Vec<&MessageId> {
        self.messages.iter().filter_map(|m| m.confirmed_id()).collect()
    }

    pub fn alignment_for(message: &Message, viewer: &Principal) -> Alignment {
        if message.is_authored_by(viewer) {
            Alignment::Own
        } else {
            Alignment::Other
        }
    }
}

impl PartialEq for FeedView {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages) || self.messages == other.messages
    }
}

impl Eq for FeedView {}
