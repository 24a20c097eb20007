//! Consent-link flow for attaching a monitored account to a guardian.
//!
//! The flow collects a draft (account identifier + affirmed consent),
//! hands off to the external provider for authorization, and exchanges the
//! returned code for a linked account. An explicit state machine guards the
//! phases; the draft persists across the provider navigation and is
//! consumed exactly once.

mod backend;
mod debounce;
mod error;
mod flow;
mod fsm;

pub use backend::LinkBackend;
pub use debounce::DebouncedLookup;
pub use error::{LinkError, LinkResult};
pub use flow::{CallbackParams, ConsentLinkFlow, LinkRequest, LinkSettings};
pub use fsm::{LinkMachine, LinkMachineInput, LinkMachineState, LinkState};
