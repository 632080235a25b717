//! Compose buffer and outgoing-message dispatcher.
//!
//! A submitted message goes draft → pending → acknowledged, or pending →
//! rolled back when the store rejects it. Nothing is retried.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FeedError, FeedResult};
use crate::event::FeedEvent;
use crate::store::FeedStore;
use crate::synchronizer::FeedShared;
use crate::types::{AppendAck, MessageId, NewRecord, Principal, TempId};

/// Result of [`Dispatcher::submit`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// The draft was empty or whitespace; nothing was sent.
    Ignored,
    /// The store accepted the message.
    Acknowledged { temp_id: TempId, ack: AppendAck },
}

/// The user's in-progress message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ComposeBuffer {
    draft: String,
}

impl ComposeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn as_str(&self) -> &str {
        &self.draft
    }

    /// The draft with surrounding whitespace removed, or `None` if nothing
    /// would remain.
    pub fn trimmed(&self) -> Option<&str> {
        let trimmed = self.draft.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn clear(&mut self) {
        self.draft.clear();
    }
}

/// Writes the current principal's messages through to the store.
pub struct Dispatcher {
    principal: Principal,
    store: Arc<dyn FeedStore>,
    shared: Arc<FeedShared>,
    compose: Mutex<ComposeBuffer>,
}

impl Dispatcher {
    pub(crate) fn new(
        principal: Principal,
        store: Arc<dyn FeedStore>,
        shared: Arc<FeedShared>,
    ) -> Self {
        Self {
            principal,
            store,
            shared,
            compose: Mutex::new(ComposeBuffer::new()),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Replaces the draft. No validation happens until submit.
    pub fn set_draft(&self, text: impl Into<String>) {
        self.compose.lock().set(text);
    }

    pub fn draft(&self) -> String {
        self.compose.lock().as_str().to_string()
    }

    /// Sends the draft.
    ///
    /// The message appears in the view as pending before the store is
    /// contacted, and the draft is cleared. A blank draft is ignored and left
    /// untouched.
    pub async fn submit(&self) -> FeedResult<SubmitOutcome> {
        // Taken and cleared under one lock: a draft is sent at most once.
        let text = {
            let mut compose = self.compose.lock();
            let Some(text) = compose.trimmed().map(str::to_string) else {
                debug!("ignoring blank submit");
                return Ok(SubmitOutcome::Ignored);
            };
            if self.shared.is_closed() {
                return Err(FeedError::SessionClosed);
            }
            compose.clear();
            text
        };

        let temp_id = match self.shared.insert_pending(&self.principal, text.clone()) {
            Ok(temp_id) => temp_id,
            Err(err) => {
                // Closed in between; hand the text back unless a new draft exists.
                let mut compose = self.compose.lock();
                if compose.as_str().is_empty() {
                    compose.set(text);
                }
                return Err(err);
            }
        };

        let record = NewRecord::new(&self.principal, text.clone(), temp_id.clone());
        match self.store.append(record).await {
            Ok(ack) => {
                info!(temp_id = %temp_id, id = %ack.id, "message acknowledged");
                self.shared.acknowledge(&temp_id, ack.clone());
                Ok(SubmitOutcome::Acknowledged { temp_id, ack })
            }
            Err(err) => {
                self.shared.roll_back(&temp_id, text, &err);
                Err(FeedError::DispatchFailed(err))
            }
        }
    }

    /// Deletes a confirmed message authored by the current principal.
    ///
    /// Messages by other authors, and messages not in the current view, are
    /// refused without contacting the store. A store rejection leaves local
    /// state unchanged.
    pub async fn delete_own_message(&self, id: &MessageId) -> FeedResult<()> {
        if self.shared.is_closed() {
            return Err(FeedError::SessionClosed);
        }

        let view = self.shared.view();
        let refusal = match view.get(id) {
            None => Some(FeedError::MessageNotFound(id.clone())),
            Some(message) if !message.is_authored_by(&self.principal) => {
                Some(FeedError::NotAuthor(id.clone()))
            }
            Some(_) => None,
        };
        if let Some(err) = refusal {
            self.reject_delete(id, &err);
            return Err(err);
        }

        match self.store.delete(id).await {
            Ok(()) => {
                info!(id = %id, "message deleted");
                self.shared.forget_acknowledged(id);
                Ok(())
            }
            Err(source) => {
                let err = FeedError::DeleteRejected {
                    id: id.clone(),
                    source,
                };
                self.reject_delete(id, &err);
                Err(err)
            }
        }
    }

    fn reject_delete(&self, id: &MessageId, err: &FeedError) {
        warn!(id = %id, error = %err, "delete rejected");
        self.shared.emit(FeedEvent::DeleteRejected {
            id: id.clone(),
            reason: err.to_string(),
        });
    }
}
