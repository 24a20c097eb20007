//! Error types for the consent-link flow.

use thiserror::Error;

/// Errors raised by the consent-link flow.
///
/// Everything here is recoverable from the guardian's point of view: the
/// session survives, and a new draft can be submitted. Validation errors are
/// raised before any network call is made.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Input rejected before any state change or network call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The identifier is already linked to this guardian
    #[error("Account '{0}' is already linked")]
    DuplicateIdentifier(String),

    /// The provider callback was malformed or reported an error
    #[error("Provider callback invalid: {0}")]
    CallbackInvalid(String),

    /// The callback's correlation token matched no pending draft
    #[error("Stale callback: no pending draft for this correlation token")]
    StaleCallback,

    /// The server rejected the authorization code exchange
    #[error("Code exchange rejected: {0}")]
    ExchangeRejected(String),

    /// The requested input is not legal in the current flow state
    #[error("Invalid flow transition: {0}")]
    InvalidStateTransition(String),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] sentiwatch_transport::TransportError),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] sentiwatch_store::StoreError),

    /// URL construction or parsing failure
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias using LinkError.
pub type LinkResult<T> = Result<T, LinkError>;
