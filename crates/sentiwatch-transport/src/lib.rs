//! Authenticated HTTP transport for the sentiwatch client.
//!
//! Wraps the backend API with bearer-token attachment, a shared
//! single-flight token refresh, and session lifecycle events.

mod error;
mod refresh;
mod transport;
mod types;

pub use error::{AuthError, TransportError, TransportResult};
pub use transport::{AuthTransport, SessionEvent};
pub use types::{
    ExchangeResponse, ItemRecord, LinkedAccount, LoginResponse, RefreshResponse, Sentiment,
    UserProfile,
};
