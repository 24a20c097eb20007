//! Core types, configuration, and utilities for the sentiwatch client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_AUTHORIZE_URL, DEFAULT_CLIENT_ID, DEFAULT_DEBOUNCE_MS,
    DEFAULT_LOG_LEVEL,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REDIRECT_URI, DEFAULT_SCOPES,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
