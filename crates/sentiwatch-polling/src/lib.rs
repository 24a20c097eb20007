//! Periodic source monitoring for the sentiwatch client.
//!
//! Every monitored account gets its own polling task: an immediate first
//! fetch, a fixed interval after that, and a per-source baseline that turns
//! raw item counts into new-item deltas.

mod delta;
mod engine;

pub use delta::{advance_baseline, new_item_count};
pub use engine::{PollSubscription, PollTick, PollingEngine, SourceFetcher, TickStatus};

use thiserror::Error;

/// Error type for polling operations.
#[derive(Error, Debug)]
pub enum PollError {
    /// The source is already monitored
    #[error("Source '{0}' is already being monitored")]
    AlreadyMonitoring(String),

    /// The source is not monitored
    #[error("Source '{0}' is not being monitored")]
    UnknownSource(String),

    /// A fetch for this source is still running
    #[error("A fetch for source '{0}' is already in flight")]
    FetchInProgress(String),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] sentiwatch_transport::TransportError),
}

/// Result type alias using PollError.
pub type PollResult<T> = Result<T, PollError>;
