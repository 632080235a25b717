//! Identity session provider contract.

use async_trait::async_trait;
use feed_sync::Principal;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Errors reported by an identity provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The provider refused the credentials or the account.
    #[error("sign-in rejected: {0}")]
    Rejected(String),

    /// The user dismissed the sign-in flow.
    #[error("sign-in cancelled")]
    Cancelled,

    /// Network or backend failure.
    #[error("identity transport error: {0}")]
    Transport(String),
}

/// Result type alias using IdentityError.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Session notifications: the current principal, or `None` when signed out.
///
/// Delivered at least once per change; the first item reflects the
/// session at subscription time.
pub type SessionStream = BoxStream<'static, Option<Principal>>;

/// Client of the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribes to session changes.
    fn observe_session(&self) -> SessionStream;

    /// Runs the interactive sign-in flow.
    async fn sign_in(&self) -> IdentityResult<Principal>;

    /// Ends the current session.
    async fn sign_out(&self) -> IdentityResult<()>;
}
