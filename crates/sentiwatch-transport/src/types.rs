//! Wire types shared with the backend API.

use serde::{Deserialize, Serialize};

/// Guardian user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A monitored account linked through the consent flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedAccount {
    /// Server-side identifier for the linked account
    pub id: String,
    /// The monitored subject's account identifier
    pub username: String,
    /// Provider-side user id, if known
    #[serde(default)]
    pub subject_user_id: Option<String>,
    /// When the link was established (RFC 3339 timestamp)
    pub created_at: String,
}

/// Sentiment classification attached to a fetched item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Toxic,
}

/// A single fetched item (a comment on the monitored account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub text: String,
    pub sentiment: Sentiment,
    pub created_at: String,
}

/// Response from the login endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

/// Response from the token refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// Response from the consent-link code exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    pub access: String,
    pub refresh: String,
    pub linked_account: LinkedAccount,
    pub user: UserProfile,
}
