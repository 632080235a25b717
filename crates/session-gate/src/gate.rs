//! The session gate.
//!
//! Owns the feed for exactly one principal at a time. Every session change
//! tears the previous feed down completely before a new one starts, so
//! nothing (view, pending messages, subscription) crosses identities.

use std::sync::Arc;

use feed_config_and_utils::FeedConfig;
use feed_sync::{
    Dispatcher, FeedEvent, FeedEventSink, FeedStore, FeedSynchronizer, FeedView, Principal,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{GateError, GateResult};
use crate::identity::IdentityProvider;
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionPhase};

/// The current session as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub principal: Option<Principal>,
    pub phase: SessionPhase,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.principal.is_some() && self.phase.is_active()
    }
}

/// Feed components owned by one active session.
struct ActiveSession {
    synchronizer: FeedSynchronizer,
    dispatcher: Arc<Dispatcher>,
}

struct Current {
    principal: Option<Principal>,
    phase: SessionPhase,
    active: Option<Arc<ActiveSession>>,
}

/// Handle to the task that feeds provider notifications into the gate.
#[derive(Debug)]
pub struct ObserverHandle {
    abort: AbortHandle,
}

impl ObserverHandle {
    /// Stops observing. Already-applied notifications stay applied.
    pub fn stop(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Gates the feed on an authenticated session.
pub struct SessionGate {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn FeedStore>,
    sink: Arc<dyn FeedEventSink>,
    config: FeedConfig,
    /// Serializes transitions; held across provider calls.
    machine: tokio::sync::Mutex<SessionMachine>,
    current: Mutex<Current>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionGate {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn FeedStore>,
        sink: Arc<dyn FeedEventSink>,
        config: FeedConfig,
    ) -> Self {
        Self {
            identity,
            store,
            sink,
            config,
            machine: tokio::sync::Mutex::new(SessionMachine::new()),
            current: Mutex::new(Current {
                principal: None,
                phase: SessionPhase::SignedOut,
                active: None,
            }),
            observer: Mutex::new(None),
        }
    }

    /// Current principal and phase.
    pub fn session(&self) -> Session {
        let current = self.current.lock();
        Session {
            principal: current.principal.clone(),
            phase: current.phase,
        }
    }

    /// The active session's feed view, or an empty view when signed out.
    pub fn feed_view(&self) -> FeedView {
        self.current
            .lock()
            .active
            .as_ref()
            .map(|active| active.synchronizer.view())
            .unwrap_or_default()
    }

    /// The active session's dispatcher.
    ///
    /// A dispatcher kept past the end of its session refuses further work
    /// with `FeedError::SessionClosed`.
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.current
            .lock()
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.dispatcher))
    }

    /// Whether the active session's feed is receiving snapshots.
    pub fn is_syncing(&self) -> bool {
        self.current
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| active.synchronizer.is_subscribed())
    }

    /// Applies one provider notification.
    ///
    /// Repeated notifications for the same principal are ignored. A
    /// different principal replaces the session; `None` ends it.
    pub async fn on_session_change(&self, principal: Option<Principal>) -> GateResult<()> {
        let mut machine = self.machine.lock().await;
        self.apply_change(&mut machine, principal).await
    }

    /// Runs the provider's sign-in flow.
    ///
    /// On failure the session stays signed out and `FeedEvent::AuthFailed`
    /// is emitted.
    pub async fn sign_in(&self) -> GateResult<Principal> {
        let mut machine = self.machine.lock().await;
        self.transition(&mut machine, SessionMachineInput::SignInRequested)?;

        match self.identity.sign_in().await {
            Ok(principal) => {
                info!(principal_id = %principal.id, "sign-in succeeded");
                self.apply_change(&mut machine, Some(principal.clone()))
                    .await?;
                Ok(principal)
            }
            Err(err) => {
                self.transition(&mut machine, SessionMachineInput::SignInFailed)?;
                warn!(error = %err, "sign-in failed");
                self.sink.emit(FeedEvent::AuthFailed {
                    reason: err.to_string(),
                });
                Err(GateError::AuthFailed(err))
            }
        }
    }

    /// Signs out through the provider and tears the session down.
    ///
    /// If the provider fails, the session stays active.
    pub async fn sign_out(&self) -> GateResult<()> {
        let mut machine = self.machine.lock().await;
        if self.current.lock().active.is_none() {
            return Err(GateError::NoSession);
        }
        self.transition(&mut machine, SessionMachineInput::SignOutRequested)?;

        match self.identity.sign_out().await {
            Ok(()) => {
                self.end_session();
                self.transition(&mut machine, SessionMachineInput::SignOutCompleted)?;
                info!("signed out");
                Ok(())
            }
            Err(err) => {
                self.transition(&mut machine, SessionMachineInput::SignOutFailed)?;
                warn!(error = %err, "sign-out failed");
                Err(GateError::SignOutFailed(err))
            }
        }
    }

    /// Spawns a task that drives the provider's session notifications into
    /// the gate. Replaces any previous observer.
    pub fn spawn_observer(self: &Arc<Self>) -> ObserverHandle {
        let gate = Arc::clone(self);
        let mut sessions = self.identity.observe_session();
        let handle = tokio::spawn(async move {
            while let Some(principal) = sessions.next().await {
                if let Err(err) = gate.on_session_change(principal).await {
                    warn!(error = %err, "failed to apply session change");
                }
            }
            debug!("session notifications ended");
        });

        let observer = ObserverHandle {
            abort: handle.abort_handle(),
        };
        if let Some(previous) = self.observer.lock().replace(handle) {
            previous.abort();
        }
        observer
    }

    /// Stops the observer and tears down the active session.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.observer.lock().take() {
            handle.abort();
        }
        let mut machine = self.machine.lock().await;
        if let Err(err) = self.apply_change(&mut machine, None).await {
            warn!(error = %err, "session teardown during shutdown failed");
        }
        info!("session gate shut down");
    }

    async fn apply_change(
        &self,
        machine: &mut SessionMachine,
        principal: Option<Principal>,
    ) -> GateResult<()> {
        let Some(principal) = principal else {
            self.transition(machine, SessionMachineInput::NoneObserved)?;
            self.end_session();
            return Ok(());
        };

        let unchanged = {
            let current = self.current.lock();
            current.active.is_some()
                && current.principal.as_ref().map(|p| &p.id) == Some(&principal.id)
        };
        if unchanged {
            debug!(principal_id = %principal.id, "ignoring repeated session notification");
            return Ok(());
        }

        self.transition(machine, SessionMachineInput::PrincipalObserved)?;
        self.start_session(principal).await
    }

    async fn start_session(&self, principal: Principal) -> GateResult<()> {
        self.end_session();

        let synchronizer = FeedSynchronizer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            self.config.clone(),
        );
        let dispatcher = Arc::new(synchronizer.dispatcher(principal.clone()));
        let active = Arc::new(ActiveSession {
            synchronizer,
            dispatcher,
        });

        {
            let mut current = self.current.lock();
            current.principal = Some(principal.clone());
            current.active = Some(Arc::clone(&active));
        }
        info!(principal_id = %principal.id, "session started");
        self.sink.emit(FeedEvent::SessionChanged {
            principal: Some(principal),
        });

        active.synchronizer.subscribe().await?;
        Ok(())
    }

    /// Closes the active session's feed, discarding its view and pending
    /// messages. No-op when signed out.
    fn end_session(&self) {
        let (previous, active) = {
            let mut current = self.current.lock();
            (current.principal.take(), current.active.take())
        };

        if let Some(active) = active {
            active.synchronizer.close();
        }
        if let Some(previous) = previous {
            info!(principal_id = %previous.id, "session ended");
            self.sink.emit(FeedEvent::SessionChanged { principal: None });
        }
    }

    fn transition(
        &self,
        machine: &mut SessionMachine,
        input: SessionMachineInput,
    ) -> GateResult<SessionPhase> {
        let old_phase = SessionPhase::from(machine.state());

        machine.consume(&input).map_err(|_| {
            GateError::InvalidTransition(format!(
                "cannot apply {:?} in state {:?}",
                input,
                machine.state()
            ))
        })?;

        let new_phase = SessionPhase::from(machine.state());
        self.current.lock().phase = new_phase;

        if old_phase != new_phase {
            debug!(
                old_phase = ?old_phase,
                new_phase = ?new_phase,
                "session state transition"
            );
        }
        Ok(new_phase)
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        if let Some(handle) = self.observer.get_mut().take() {
            handle.abort();
        }
    }
}
