//! Session gating for the chat feed.
//!
//! This crate provides:
//! - IdentityProvider: contract for the external identity service
//! - SessionGate: starts and tears down the feed as principals come and go
//! - Explicit FSM-based session state management
//! - InMemoryIdentity: scripted provider for tests

mod error;
mod gate;
mod identity;
pub mod memory;
mod session_fsm;

#[cfg(test)]
mod tests;

pub use error::{GateError, GateResult};
pub use gate::{ObserverHandle, Session, SessionGate};
pub use identity::{IdentityError, IdentityProvider, IdentityResult, SessionStream};
pub use memory::InMemoryIdentity;
pub use session_fsm::session_machine;
pub use session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionPhase};
