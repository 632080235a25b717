//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │    SignedOut    │ (initial)
//! └────────┬────────┘
//!          │ SignInRequested              PrincipalObserved
//!          ▼                      ┌──────────────────────────┐
//! ┌─────────────────┐             │                          │
//! │    SigningIn    │ ── SignInFailed ──► SignedOut           │
//! └────────┬────────┘                                        │
//!          │ PrincipalObserved                               │
//!          ▼                                                 │
//! ┌─────────────────┐ ◄──────────────────────────────────────┘
//! │     Active      │ ── NoneObserved ──► SignedOut
//! └────────┬────────┘
//!          │ SignOutRequested
//!          ▼
//! ┌─────────────────┐
//! │   SigningOut    │ ── SignOutFailed ──► Active
//! └────────┬────────┘
//!          │ SignOutCompleted / NoneObserved
//!          ▼
//!      SignedOut
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Generates a module `session_machine` with State, Input and StateMachine.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(SignedOut)

    SignedOut => {
        SignInRequested => SigningIn,
        // The provider restored a session on its own
        PrincipalObserved => Active,
        NoneObserved => SignedOut
    },
    SigningIn => {
        PrincipalObserved => Active,
        SignInFailed => SignedOut,
        // The initial "no session" notification can race the sign-in
        NoneObserved => SigningIn
    },
    Active => {
        // Same or replacement principal
        PrincipalObserved => Active,
        SignOutRequested => SigningOut,
        NoneObserved => SignedOut
    },
    SigningOut => {
        SignOutCompleted => SignedOut,
        NoneObserved => SignedOut,
        SignOutFailed => Active
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    SignedOut,
    SigningIn,
    Active,
    SigningOut,
}

impl SessionPhase {
    /// Returns true if a principal is signed in (Active only).
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Active)
    }

    /// Returns true while a sign-in or sign-out is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionPhase::SigningIn | SessionPhase::SigningOut)
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::SignedOut => SessionPhase::SignedOut,
            SessionMachineState::SigningIn => SessionPhase::SigningIn,
            SessionMachineState::Active => SessionPhase::Active,
            SessionMachineState::SigningOut => SessionPhase::SigningOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_signed_out() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_sign_in_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::SignInRequested).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SigningIn);

        machine.consume(&SessionMachineInput::PrincipalObserved).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Active);
    }

    #[test]
    fn test_sign_in_failure_returns_to_signed_out() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::SignInRequested).unwrap();
        machine.consume(&SessionMachineInput::SignInFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_restored_session_goes_straight_to_active() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::NoneObserved).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);

        machine.consume(&SessionMachineInput::PrincipalObserved).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Active);
    }

    #[test]
    fn test_initial_none_during_sign_in_is_ignored() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::SignInRequested).unwrap();
        machine.consume(&SessionMachineInput::NoneObserved).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SigningIn);
    }

    #[test]
    fn test_sign_out_flow() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::PrincipalObserved).unwrap();

        machine.consume(&SessionMachineInput::SignOutRequested).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SigningOut);

        machine.consume(&SessionMachineInput::SignOutCompleted).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_sign_out_failure_keeps_session() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::PrincipalObserved).unwrap();
        machine.consume(&SessionMachineInput::SignOutRequested).unwrap();

        machine.consume(&SessionMachineInput::SignOutFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Active);
    }

    #[test]
    fn test_provider_can_end_active_session() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::PrincipalObserved).unwrap();

        machine.consume(&SessionMachineInput::NoneObserved).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_invalid_transition_returns_error() {
        let mut machine = SessionMachine::new();

        // Can't sign out from SignedOut
        assert!(machine.consume(&SessionMachineInput::SignOutRequested).is_err());

        // Can't fail a sign-in that never started
        assert!(machine.consume(&SessionMachineInput::SignInFailed).is_err());

        // Can't sign in twice
        machine.consume(&SessionMachineInput::PrincipalObserved).unwrap();
        assert!(machine.consume(&SessionMachineInput::SignInRequested).is_err());
    }

    #[test]
    fn test_session_phase_conversion() {
        assert_eq!(
            SessionPhase::from(&SessionMachineState::SignedOut),
            SessionPhase::SignedOut
        );
        assert_eq!(
            SessionPhase::from(&SessionMachineState::SigningIn),
            SessionPhase::SigningIn
        );
        assert_eq!(
            SessionPhase::from(&SessionMachineState::Active),
            SessionPhase::Active
        );
        assert_eq!(
            SessionPhase::from(&SessionMachineState::SigningOut),
            SessionPhase::SigningOut
        );
    }

    #[test]
    fn test_session_phase_predicates() {
        assert!(SessionPhase::Active.is_active());
        assert!(!SessionPhase::SigningIn.is_active());
        assert!(SessionPhase::SigningIn.is_transient());
        assert!(SessionPhase::SigningOut.is_transient());
        assert!(!SessionPhase::SignedOut.is_transient());
    }

    #[test]
    fn test_session_phase_serializes_snake_case() {
        let json = serde_json::to_string(&SessionPhase::SigningOut).unwrap();
        assert_eq!(json, "\"signing_out\"");
    }
}
