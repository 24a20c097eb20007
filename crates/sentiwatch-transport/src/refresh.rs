//! Single-flight token refresh coordination.

use crate::{AuthError, TransportError, TransportResult};
use sentiwatch_store::TokenStore;
use std::future::Future;
use tokio::sync::Mutex;

/// Serializes token refreshes so a burst of rejected requests produces
/// exactly one refresh call.
///
/// Every caller that saw a 401 arrives here carrying the access token its
/// request used. Callers queue on the mutex; the first one through performs
/// the refresh and replaces the stored access token. Each later caller,
/// once it acquires the lock, sees that the stored token no longer matches
/// the stale one it carried and returns immediately, so it retries its
/// request with the fresh token without a second refresh call.
pub(crate) struct RefreshGate {
    lock: Mutex<()>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }

    /// Ensure the given stale access token has been replaced in the store.
    ///
    /// `refresh` receives the current refresh token and must return the new
    /// access token. A rejected refresh clears the stored session before the
    /// error is returned; a transient failure leaves the session intact so
    /// the caller can retry later.
    pub async fn ensure_fresh<F, Fut>(
        &self,
        tokens: &TokenStore,
        stale_access: &str,
        refresh: F,
    ) -> TransportResult<()>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = TransportResult<String>>,
    {
        let _guard = self.lock.lock().await;

        let current = tokens.get()?.ok_or(AuthError::NotLoggedIn)?;
        if current.access_token != stale_access {
            tracing::debug!("access token already refreshed by another caller");
            return Ok(());
        }

        tracing::debug!("refreshing access token");
        match refresh(current.refresh_token).await {
            Ok(new_access) => {
                tokens.set_access_token(&new_access)?;
                Ok(())
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "token refresh failed with transient error");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh rejected, clearing session");
                tokens.clear()?;
                match e {
                    TransportError::Auth(auth) => Err(TransportError::Auth(auth)),
                    other => Err(TransportError::Auth(AuthError::RefreshRejected(
                        other.to_string(),
                    ))),
                }
            }
        }
    }
}
