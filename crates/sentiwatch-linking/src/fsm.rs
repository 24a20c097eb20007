//! Consent-link state machine using rust-fsm.
//!
//! The flow hands control to an external provider mid-way, so the machine
//! is explicit about which inputs are legal in each phase; anything else is
//! rejected rather than silently absorbed.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │      Idle       │ (initial)
//! └────────┬────────┘
//!          │ DraftAccepted
//!          ▼
//! ┌─────────────────┐  Declined   ┌─────────────────┐
//! │  DraftEntered   │ ──────────► │    Abandoned    │
//! └────────┬────────┘             └─────────────────┘
//!          │ RedirectStarted              ▲
//!          ▼                              │ Declined
//! ┌─────────────────┐ ────────────────────┘
//! │   Redirected    │
//! └────────┬────────┘  CallbackInvalid
//!          │ CallbackReturned ──────────► Failed
//!          ▼
//! ┌─────────────────┐  ExchangeFailed  ┌─────────────────┐
//! │   Exchanging    │ ───────────────► │     Failed      │
//! └────────┬────────┘                  └─────────────────┘
//!          │ ExchangeSucceeded
//!          ▼
//! ┌─────────────────┐
//! │     Linked      │
//! └─────────────────┘
//!
//! Linked, Failed and Abandoned accept DraftAccepted to start over.
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro
// This generates a module `link_machine` with:
// - link_machine::State (enum)
// - link_machine::Input (enum)
// - link_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub link_machine(Idle)

    Idle => {
        DraftAccepted => DraftEntered
    },
    DraftEntered => {
        // A new draft replaces the pending one
        DraftAccepted => DraftEntered,
        RedirectStarted => Redirected,
        Declined => Abandoned
    },
    Redirected => {
        CallbackReturned => Exchanging,
        CallbackInvalid => Failed,
        Declined => Abandoned
    },
    Exchanging => {
        ExchangeSucceeded => Linked,
        ExchangeFailed => Failed
    },
    Linked => {
        DraftAccepted => DraftEntered
    },
    Failed => {
        DraftAccepted => DraftEntered
    },
    Abandoned => {
        DraftAccepted => DraftEntered
    }
}

// Re-export the generated types with clearer names
pub use link_machine::Input as LinkMachineInput;
pub use link_machine::State as LinkMachineState;
pub use link_machine::StateMachine as LinkMachine;

/// Link-flow state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No flow in progress.
    Idle,
    /// A validated draft is held, awaiting redirect.
    DraftEntered,
    /// Control handed to the external provider.
    Redirected,
    /// Authorization code received, exchange in flight.
    Exchanging,
    /// The account is linked.
    Linked,
    /// The flow failed; the draft was discarded.
    Failed,
    /// The guardian abandoned the flow.
    Abandoned,
}

impl LinkState {
    /// Whether the flow has reached a resting state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Linked | LinkState::Failed | LinkState::Abandoned)
    }
}

impl From<&LinkMachineState> for LinkState {
    fn from(state: &LinkMachineState) -> Self {
        match state {
            LinkMachineState::Idle => LinkState::Idle,
            LinkMachineState::DraftEntered => LinkState::DraftEntered,
            LinkMachineState::Redirected => LinkState::Redirected,
            LinkMachineState::Exchanging => LinkState::Exchanging,
            LinkMachineState::Linked => LinkState::Linked,
            LinkMachineState::Failed => LinkState::Failed,
            LinkMachineState::Abandoned => LinkState::Abandoned,
        }
    }
}
