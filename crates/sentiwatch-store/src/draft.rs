//! Consent draft persistence.
//!
//! The consent-link flow hands control to an external provider and resumes
//! after a full navigation, so the draft must outlive the process view that
//! created it. The draft id doubles as the correlation token carried through
//! the provider round-trip.

use crate::{KeyValueStore, StoreError, StoreKeys, StoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A pending consent-link draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentDraft {
    /// Correlation token for the provider round-trip
    pub draft_id: String,
    /// Identifier of the monitored subject's account
    pub subject_identifier: String,
    /// Whether the subject's consent was affirmed
    pub consent_given: bool,
    /// When the draft was created (RFC 3339 timestamp)
    pub created_at: String,
}

impl ConsentDraft {
    /// Create a new draft with a fresh correlation token.
    pub fn new(subject_identifier: &str, consent_given: bool) -> Self {
        Self {
            draft_id: uuid::Uuid::new_v4().to_string(),
            subject_identifier: subject_identifier.to_string(),
            consent_given,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Durable store for the single pending consent draft.
///
/// Only one draft is pending at a time; saving a new draft replaces the old
/// one. `take` consumes the draft under a single storage operation, so a
/// replayed provider callback carrying the same correlation token finds
/// nothing and is rejected as stale.
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore").finish_non_exhaustive()
    }
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist a draft, replacing any existing one.
    pub fn save(&self, draft: &ConsentDraft) -> StoreResult<()> {
        let json =
            serde_json::to_string(draft).map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.store.set(StoreKeys::CONSENT_DRAFT, &json)?;
        tracing::debug!(draft_id = %draft.draft_id, "persisted consent draft");
        Ok(())
    }

    /// Load the pending draft without consuming it.
    pub fn load(&self) -> StoreResult<Option<ConsentDraft>> {
        match self.store.get(StoreKeys::CONSENT_DRAFT)? {
            Some(json) => {
                let draft: ConsentDraft = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Encoding(e.to_string()))?;
                Ok(Some(draft))
            }
            None => Ok(None),
        }
    }

    /// Consume the pending draft if its id matches the given correlation
    /// token. Returns `None` when no draft is pending or the token does not
    /// match; a matching draft is removed so a second call with the same
    /// token also returns `None`.
    ///
    /// Removal comes first: the backend's atomic `take` picks exactly one
    /// winner among concurrent callers, and a non-matching draft is written
    /// back untouched.
    pub fn take(&self, draft_id: &str) -> StoreResult<Option<ConsentDraft>> {
        let Some(json) = self.store.take(StoreKeys::CONSENT_DRAFT)? else {
            return Ok(None);
        };
        let draft: ConsentDraft =
            serde_json::from_str(&json).map_err(|e| StoreError::Encoding(e.to_string()))?;
        if draft.draft_id != draft_id {
            self.store.set(StoreKeys::CONSENT_DRAFT, &json)?;
            return Ok(None);
        }
        tracing::debug!(draft_id, "consumed consent draft");
        Ok(Some(draft))
    }

    /// Discard any pending draft. Idempotent.
    pub fn clear(&self) -> StoreResult<()> {
        let _ = self.store.delete(StoreKeys::CONSENT_DRAFT);
        Ok(())
    }
}
