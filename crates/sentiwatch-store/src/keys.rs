//! Storage key constants.

/// Storage keys used by the client
pub struct StoreKeys;

impl StoreKeys {
    /// Credential pair (JSON: access + refresh token)
    pub const CREDENTIALS: &'static str = "credentials";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "session_meta";

    /// Pending consent-link draft (JSON)
    pub const CONSENT_DRAFT: &'static str = "consent_draft";
}
