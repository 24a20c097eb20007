//! Error types for the authenticated transport.

use thiserror::Error;

/// Authentication errors. These terminate the session: the caller is
/// expected to clear stored credentials and stop all background work.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected by the server
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The refresh endpoint rejected the refresh token
    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    /// A request was rejected even after a successful refresh
    #[error("Session rejected by server")]
    SessionRejected,

    /// No stored session
    #[error("Not logged in")]
    NotLoggedIn,
}

/// Transport-level errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Authentication failure (session teardown)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Non-success response from the API
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// HTTP/network error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] sentiwatch_store::StoreError),
}

impl TransportError {
    /// Whether this error is transient and worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            TransportError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
