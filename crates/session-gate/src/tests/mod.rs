//! Integration tests for the session gate.
//!
//! Test organization follows the gate rules:
//!
//! - `lifecycle.rs` - Rules 1-8 (Session Lifecycle & Isolation)
//! - `failures.rs`  - Rules 9-15 (Auth Failures & Observer)

mod lifecycle;

use std::sync::Arc;

use feed_config_and_utils::FeedConfig;
use feed_sync::{FeedEvent, InMemoryFeedStore, Principal, RecordingSink};

use crate::memory::InMemoryIdentity;
use crate::SessionGate;

pub(crate) fn ada() -> Principal {
    Principal::new("u1", "Ada", "https://img/ada.png")
}

pub(crate) fn grace() -> Principal {
    Principal::new("u2", "Grace", "https://img/grace.png")
}

pub(crate) struct Harness {
    pub identity: Arc<InMemoryIdentity>,
    pub store: Arc<InMemoryFeedStore>,
    pub sink: Arc<RecordingSink>,
    pub gate: Arc<SessionGate>,
}

impl Harness {
    pub fn new() -> Self {
        let identity = Arc::new(InMemoryIdentity::new());
        let store = Arc::new(InMemoryFeedStore::new());
        let sink = Arc::new(RecordingSink::new());
        let gate = Arc::new(SessionGate::new(
            identity.clone(),
            store.clone(),
            sink.clone(),
            FeedConfig::default(),
        ));
        Self {
            identity,
            store,
            sink,
            gate,
        }
    }

    /// A gate with `principal` signed in and its feed subscribed.
    pub async fn signed_in(principal: Principal) -> Self {
        let h = Self::new();
        h.identity.script_sign_in(Ok(principal));
        h.gate.sign_in().await.unwrap();
        settle().await;
        h
    }

    /// Principals announced through `SessionChanged`, oldest first.
    pub fn session_changes(&self) -> Vec<Option<Principal>> {
        self.sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FeedEvent::SessionChanged { principal } => Some(principal),
                _ => None,
            })
            .collect()
    }
}

/// Lets spawned tasks drain their channels.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Basic workflow test demonstrating core functionality.
#[tokio::test]
async fn basic_workflow() {
    let h = Harness::new();
    assert!(!h.gate.session().is_active());
    assert!(h.gate.dispatcher().is_none());

    // Sign in
    h.identity.script_sign_in(Ok(ada()));
    let principal = h.gate.sign_in().await.unwrap();
    assert_eq!(principal, ada());
    settle().await;
    assert!(h.gate.session().is_active());
    assert!(h.gate.is_syncing());

    // Send a message
    let dispatcher = h.gate.dispatcher().unwrap();
    dispatcher.set_draft("hello");
    dispatcher.submit().await.unwrap();
    settle().await;
    assert_eq!(h.gate.feed_view().len(), 1);

    // Sign out
    h.gate.sign_out().await.unwrap();
    assert!(!h.gate.session().is_active());
    assert!(h.gate.feed_view().is_empty());
    assert_eq!(h.session_changes(), vec![Some(ada()), None]);
}
