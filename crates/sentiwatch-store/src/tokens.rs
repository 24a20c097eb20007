//! Credential storage for the authenticated session.

use crate::{KeyValueStore, StoreError, StoreKeys, StoreResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Access/refresh token pair for the guardian session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Session metadata cached alongside the credential pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Guardian user ID
    pub user_id: String,
    /// Guardian username for display
    pub username: String,
    /// Guardian email
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires (RFC 3339 timestamp)
    pub expires_at: String,
}

/// High-level API for storing and retrieving session credentials.
///
/// The credential pair lives under a single storage key, so a `get` never
/// observes an access token from one session and a refresh token from
/// another. Compound writes (`set`, `set_access_token`, `clear`) serialize
/// on a store-level mutex shared by all clones, so a refresh that read the
/// old pair cannot write it back over a newer session. All operations are
/// synchronous; the backing store reads through its in-memory map, so a
/// write is visible to the next read.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    write_gate: Arc<Mutex<()>>,
}

impl TokenStore {
    /// Create a new token store over the given backend.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    fn lock_writes(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.write_gate.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Retrieve the current credential pair, if a session exists.
    pub fn get(&self) -> StoreResult<Option<CredentialPair>> {
        match self.store.get(StoreKeys::CREDENTIALS)? {
            Some(json) => {
                let pair: CredentialPair = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Encoding(e.to_string()))?;
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }

    /// Store a complete session (credential pair + metadata).
    pub fn set(&self, pair: &CredentialPair, meta: &SessionMeta) -> StoreResult<()> {
        let pair_json =
            serde_json::to_string(pair).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let meta_json =
            serde_json::to_string(meta).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let _guard = self.lock_writes()?;
        self.store.set(StoreKeys::CREDENTIALS, &pair_json)?;
        self.store.set(StoreKeys::SESSION_META, &meta_json)?;
        tracing::debug!(user_id = %meta.user_id, "stored session credentials");
        Ok(())
    }

    /// Replace only the access token, keeping the refresh token.
    ///
    /// Used by the refresh path. The read-modify-write runs under the write
    /// gate. Returns an error if no session exists.
    pub fn set_access_token(&self, access_token: &str) -> StoreResult<()> {
        let _guard = self.lock_writes()?;
        let mut pair = self
            .get()?
            .ok_or_else(|| StoreError::NotFound(StoreKeys::CREDENTIALS.to_string()))?;
        pair.access_token = access_token.to_string();
        let json =
            serde_json::to_string(&pair).map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.store.set(StoreKeys::CREDENTIALS, &json)
    }

    /// Retrieve session metadata.
    pub fn session_meta(&self) -> StoreResult<Option<SessionMeta>> {
        match self.store.get(StoreKeys::SESSION_META)? {
            Some(json) => {
                let meta: SessionMeta = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Check if a session exists.
    pub fn has_session(&self) -> StoreResult<bool> {
        self.store.has(StoreKeys::CREDENTIALS)
    }

    /// Check if the session's access token is expired (or missing).
    pub fn is_expired(&self) -> StoreResult<bool> {
        match self.session_meta()? {
            Some(meta) => {
                let expires_at = chrono::DateTime::parse_from_rfc3339(&meta.expires_at)
                    .map_err(|e| StoreError::Encoding(e.to_string()))?;
                let now = chrono::Utc::now();
                // Consider expired if less than 60 seconds remaining
                Ok(expires_at.signed_duration_since(now).num_seconds() < 60)
            }
            None => Ok(true),
        }
    }

    /// Remove all session state. Idempotent.
    pub fn clear(&self) -> StoreResult<()> {
        let _guard = self.lock_writes()?;
        let _ = self.store.delete(StoreKeys::CREDENTIALS);
        let _ = self.store.delete(StoreKeys::SESSION_META);
        tracing::debug!("cleared session credentials");
        Ok(())
    }
}
