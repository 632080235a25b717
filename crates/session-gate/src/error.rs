//! Session gate error types.

use feed_sync::{ConditionKind, FeedError};
use thiserror::Error;

use crate::identity::IdentityError;

/// Session gate error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Sign-in was rejected or cancelled.
    #[error("auth failed: {0}")]
    AuthFailed(IdentityError),

    /// Sign-out failed; the session is still active.
    #[error("sign-out failed: {0}")]
    SignOutFailed(IdentityError),

    /// The operation needs an active session.
    #[error("no active session")]
    NoSession,

    /// Feed error from the active session.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Invalid transition in the session FSM.
    #[error("invalid session state transition: {0}")]
    InvalidTransition(String),
}

impl GateError {
    /// Maps the error onto the condition taxonomy reported to the UI.
    pub fn condition(&self) -> Option<ConditionKind> {
        match self {
            GateError::AuthFailed(_) => Some(ConditionKind::AuthFailed),
            GateError::Feed(err) => err.condition(),
            GateError::SignOutFailed(_) | GateError::NoSession | GateError::InvalidTransition(_) => {
                None
            }
        }
    }
}

/// Result type alias using GateError.
pub type GateResult<T> = Result<T, GateError>;
