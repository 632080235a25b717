//! In-memory identity provider for tests and local development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use feed_sync::Principal;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::identity::{IdentityError, IdentityProvider, IdentityResult, SessionStream};

#[derive(Debug, Default)]
struct IdentityState {
    current: Option<Principal>,
    sign_in_results: VecDeque<IdentityResult<Principal>>,
    next_sign_out_failure: Option<IdentityError>,
    watchers: Vec<mpsc::UnboundedSender<Option<Principal>>>,
}

impl IdentityState {
    fn notify(&mut self) {
        let current = self.current.clone();
        self.watchers
            .retain(|watcher| watcher.send(current.clone()).is_ok());
    }
}

/// An [`IdentityProvider`] with scripted sign-in outcomes.
///
/// Like a hosted identity service, every session change is pushed to all
/// observers, and a new observer immediately receives the current session.
#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    state: Mutex<IdentityState>,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next `sign_in` call. Unscripted calls fail
    /// with `IdentityError::Cancelled`.
    pub fn script_sign_in(&self, result: IdentityResult<Principal>) {
        self.state.lock().sign_in_results.push_back(result);
    }

    pub fn fail_next_sign_out(&self, err: IdentityError) {
        self.state.lock().next_sign_out_failure = Some(err);
    }

    /// Changes the session from outside the sign-in flow, as when a stored
    /// session is restored or revoked elsewhere.
    pub fn push(&self, principal: Option<Principal>) {
        let mut state = self.state.lock();
        state.current = principal;
        state.notify();
    }

    /// Re-sends the current session to every observer.
    pub fn repeat(&self) {
        self.state.lock().notify();
    }

    pub fn current(&self) -> Option<Principal> {
        self.state.lock().current.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    fn observe_session(&self) -> SessionStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        // The receiver is alive here, so the send cannot fail.
        let _ = sender.send(state.current.clone());
        state.watchers.push(sender);

        futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|principal| (principal, receiver))
        })
        .boxed()
    }

    async fn sign_in(&self) -> IdentityResult<Principal> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let principal = state
            .sign_in_results
            .pop_front()
            .unwrap_or(Err(IdentityError::Cancelled))?;
        state.current = Some(principal.clone());
        state.notify();
        Ok(principal)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(err) = state.next_sign_out_failure.take() {
            return Err(err);
        }
        state.current = None;
        state.notify();
        Ok(())
    }
}
