//! Authenticated HTTP transport.

use crate::refresh::RefreshGate;
use crate::types::{ExchangeResponse, ItemRecord, LinkedAccount, LoginResponse, RefreshResponse};
use crate::{AuthError, TransportError, TransportResult};
use reqwest::{Method, StatusCode};
use sentiwatch_store::{CredentialPair, SessionMeta, TokenStore};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Access token lifetime assumed when the server does not report one.
const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Session lifecycle events delivered to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is gone: credentials cleared, stop all background work.
    Terminated,
}

/// HTTP transport that attaches the stored bearer token to every request
/// and transparently recovers from access-token expiry.
///
/// Tokens are read from the store per attempt, never cached on the
/// transport, so a refresh performed by any caller is visible to all
/// in-flight work. A request that comes back 401 triggers one shared
/// refresh (see [`RefreshGate`]) and is retried at most once; a second 401
/// after the retry, or a rejected refresh, tears the session down and
/// broadcasts [`SessionEvent::Terminated`].
pub struct AuthTransport {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    gate: RefreshGate,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for AuthTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AuthTransport {
    /// Create a new transport against the given API base URL.
    pub fn new(base_url: &str, tokens: TokenStore) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            gate: RefreshGate::new(),
            events,
        }
    }

    /// The token store backing this transport.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ==========================================
    // Session establishment (unauthenticated)
    // ==========================================

    /// Log in with guardian credentials and store the resulting session.
    pub async fn login(&self, username: &str, password: &str) -> TransportResult<SessionMeta> {
        let url = self.endpoint("accounts/login/");
        debug!(url = %url, username, "logging in");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials.into());
        }
        let body: LoginResponse = Self::decode(response).await?;

        let meta = SessionMeta {
            user_id: username.to_string(),
            username: username.to_string(),
            email: None,
            expires_at: expiry_from_now(),
        };
        self.tokens.set(
            &CredentialPair {
                access_token: body.access,
                refresh_token: body.refresh,
            },
            &meta,
        )?;
        Ok(meta)
    }

    /// Exchange a provider authorization code for a linked account,
    /// storing the session credentials returned with it.
    pub async fn exchange_code(
        &self,
        code: &str,
        subject_identifier: &str,
    ) -> TransportResult<ExchangeResponse> {
        let url = self.endpoint("accounts/login/instagram/");
        debug!(url = %url, subject_identifier, "exchanging authorization code");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "code": code, "username": subject_identifier }))
            .send()
            .await?;
        let body: ExchangeResponse = Self::decode(response).await?;

        self.tokens.set(
            &CredentialPair {
                access_token: body.access.clone(),
                refresh_token: body.refresh.clone(),
            },
            &SessionMeta {
                user_id: body.user.id.clone(),
                username: body.user.username.clone(),
                email: body.user.email.clone(),
                expires_at: expiry_from_now(),
            },
        )?;
        Ok(body)
    }

    /// Clear the session and notify collaborators. Idempotent.
    pub fn terminate_session(&self, reason: &str) {
        warn!(reason, "terminating session");
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "failed to clear credentials during teardown");
        }
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(SessionEvent::Terminated);
    }

    /// Log out: clear credentials and stop background work.
    pub fn logout(&self) {
        self.terminate_session("logout requested");
    }

    // ==========================================
    // Authenticated requests
    // ==========================================

    /// GET an authenticated JSON endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> TransportResult<T> {
        self.request_json(Method::GET, path, None).await
    }

    /// POST to an authenticated JSON endpoint.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> TransportResult<T> {
        self.request_json(Method::POST, path, Some(body.clone())).await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> TransportResult<T> {
        let (response, used_token) = self.send_authed(method.clone(), path, body.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        debug!(path, "request rejected with 401, refreshing token");
        match self.refresh_access(&used_token).await {
            Ok(()) => {}
            Err(e @ TransportError::Auth(_)) => {
                // Session already cleared by the gate; tell everyone.
                let _ = self.events.send(SessionEvent::Terminated);
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        // Retry at most once with the refreshed token.
        let (retried, _) = self.send_authed(method, path, body.as_ref()).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            self.terminate_session("request rejected after refresh");
            return Err(AuthError::SessionRejected.into());
        }
        Self::decode(retried).await
    }

    /// Send one authenticated request, returning the response together with
    /// the access token it carried.
    async fn send_authed(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> TransportResult<(reqwest::Response, String)> {
        let pair = self.tokens.get()?.ok_or(AuthError::NotLoggedIn)?;
        let url = self.endpoint(path);

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", pair.access_token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Ok((response, pair.access_token))
    }

    /// Replace the stale access token via the shared refresh gate.
    async fn refresh_access(&self, stale_access: &str) -> TransportResult<()> {
        let url = self.endpoint("accounts/token/refresh/");
        let client = self.client.clone();

        self.gate
            .ensure_fresh(&self.tokens, stale_access, |refresh_token| async move {
                let response = client
                    .post(&url)
                    .json(&serde_json::json!({ "refresh": refresh_token }))
                    .send()
                    .await?;
                let body: RefreshResponse = Self::decode(response).await?;
                Ok(body.access)
            })
            .await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> TransportResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: summarize_body(&body),
            });
        }
        Ok(response.json::<T>().await?)
    }

    // ==========================================
    // Typed endpoints
    // ==========================================

    /// List the accounts linked to this guardian.
    pub async fn list_linked_accounts(&self) -> TransportResult<Vec<LinkedAccount>> {
        self.get_json("accounts/children/").await
    }

    /// Fetch the current items for a linked account.
    pub async fn list_items(&self, account_id: &str) -> TransportResult<Vec<ItemRecord>> {
        self.get_json(&format!("children/{}/comments/", account_id)).await
    }

    /// Ask the server to pull fresh items for a linked account now.
    pub async fn refresh_items(&self, account_id: &str) -> TransportResult<Vec<ItemRecord>> {
        self.post_json(
            &format!("children/{}/fetch-comments/", account_id),
            &serde_json::json!({}),
        )
        .await
    }
}

/// Keep error bodies log-friendly.
fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Back up to a char boundary; byte 200 may fall inside a multibyte char.
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

fn expiry_from_now() -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(ACCESS_TOKEN_TTL_SECS)).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentiwatch_store::MemoryStore;
    use std::sync::Arc;

    // Nothing listens here; connection attempts fail fast.
    const DEAD_URL: &str = "http://127.0.0.1:9/api";

    fn transport_with_session() -> AuthTransport {
        let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
        let expires = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        tokens
            .set(
                &CredentialPair {
                    access_token: "access-1".to_string(),
                    refresh_token: "refresh-1".to_string(),
                },
                &SessionMeta {
                    user_id: "user-1".to_string(),
                    username: "guardian".to_string(),
                    email: None,
                    expires_at: expires,
                },
            )
            .unwrap();
        AuthTransport::new(DEAD_URL, tokens)
    }

    #[test]
    fn endpoint_joins_paths() {
        let transport = transport_with_session();
        assert_eq!(
            transport.endpoint("accounts/login/"),
            "http://127.0.0.1:9/api/accounts/login/"
        );
        assert_eq!(
            transport.endpoint("/accounts/login/"),
            "http://127.0.0.1:9/api/accounts/login/"
        );
    }

    #[tokio::test]
    async fn request_without_session_fails_before_network() {
        let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
        let transport = AuthTransport::new(DEAD_URL, tokens);

        let result: TransportResult<Vec<LinkedAccount>> = transport.list_linked_accounts().await;
        assert!(matches!(
            result,
            Err(TransportError::Auth(AuthError::NotLoggedIn))
        ));
    }

    #[tokio::test]
    async fn network_failure_is_transient() {
        let transport = transport_with_session();

        let result: TransportResult<Vec<LinkedAccount>> = transport.list_linked_accounts().await;
        let err = result.unwrap_err();
        assert!(err.is_transient(), "connection refused should be transient");
    }

    #[tokio::test]
    async fn login_failure_against_dead_server() {
        let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
        let transport = AuthTransport::new(DEAD_URL, tokens);

        let result = transport.login("guardian", "secret").await;
        assert!(result.is_err());
        // Nothing stored on failure
        assert!(transport.tokens().get().unwrap().is_none());
    }

    #[tokio::test]
    async fn terminate_session_clears_and_notifies() {
        let transport = transport_with_session();
        let mut events = transport.subscribe_session_events();

        transport.terminate_session("test teardown");

        assert!(transport.tokens().get().unwrap().is_none());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Terminated);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let transport = transport_with_session();
        transport.logout();
        transport.logout();
        assert!(transport.tokens().get().unwrap().is_none());
    }

    #[test]
    fn summarize_body_truncates() {
        let long = "x".repeat(500);
        let summary = summarize_body(&long);
        assert!(summary.len() < 220);
        assert!(summary.ends_with("..."));
        assert_eq!(summarize_body("short"), "short");
    }

    #[test]
    fn summarize_body_respects_char_boundaries() {
        // 67 euro signs = 201 bytes; byte 200 is mid-character
        let body = "€".repeat(67);
        let summary = summarize_body(&body);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().filter(|c| *c == '€').count(), 66);

        // Error pages mixing scripts must not panic either
        let mixed = format!("{}ошибка сервера", "x".repeat(195));
        let summary = summarize_body(&mixed);
        assert!(summary.ends_with("..."));
    }
}
