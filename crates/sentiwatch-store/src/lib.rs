//! Durable client-side storage for the sentiwatch client.
//!
//! One small JSON-backed key-value store holds everything that must survive
//! a restart: the session credential pair, session metadata, and the pending
//! consent-link draft. An in-memory backend is provided for tests.

mod draft;
mod file;
mod keys;
mod memory;
mod tokens;
mod traits;

pub use draft::{ConsentDraft, DraftStore};
pub use file::FileStore;
pub use keys::StoreKeys;
pub use memory::MemoryStore;
pub use tokens::{CredentialPair, SessionMeta, TokenStore};
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
