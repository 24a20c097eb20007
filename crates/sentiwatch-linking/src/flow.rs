//! Consent-link flow driver.
//!
//! Drives the [`LinkMachine`] through draft entry, the provider redirect,
//! and the authorization-code exchange. The draft is the only state that
//! survives the redirect; its id travels to the provider as the `state`
//! query parameter and correlates the callback with the draft that
//! started it.

use crate::backend::LinkBackend;
use crate::debounce::DebouncedLookup;
use crate::fsm::{LinkMachine, LinkMachineInput, LinkState};
use crate::{LinkError, LinkResult};
use sentiwatch_store::{ConsentDraft, DraftStore};
use sentiwatch_transport::{LinkedAccount, TransportError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Provider and app settings for the link flow.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Provider authorization endpoint
    pub authorize_url: String,
    /// Provider app client id
    pub client_id: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Comma-separated permission scopes
    pub scopes: String,
    /// Quiet window for the duplicate-identifier lookup
    pub debounce_ms: u64,
}

/// The ephemeral exchange request produced by a valid provider callback.
///
/// Holds the authorization code together with the draft it was issued for.
/// Never persisted; it exists only between callback validation and the
/// exchange call.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub code: String,
    pub draft_id: String,
    pub subject_identifier: String,
}

/// Query parameters carried back from the provider.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Extract callback parameters from the return URL.
    pub fn from_url(callback_url: &str) -> LinkResult<Self> {
        let url = Url::parse(callback_url)?;
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(params)
    }
}

/// Drives one consent-link flow at a time.
///
/// A new draft replaces any pending one. The machine itself is not
/// persisted; after the full navigation to the provider and back, `resume`
/// replays the persisted draft's path before judging the callback.
pub struct ConsentLinkFlow<B: LinkBackend> {
    backend: Arc<B>,
    drafts: DraftStore,
    settings: LinkSettings,
    fsm: Mutex<LinkMachine>,
    pending: Mutex<Option<ConsentDraft>>,
    debounce: DebouncedLookup,
}

impl<B: LinkBackend> ConsentLinkFlow<B> {
    pub fn new(backend: Arc<B>, drafts: DraftStore, settings: LinkSettings) -> Self {
        let debounce = DebouncedLookup::new(Duration::from_millis(settings.debounce_ms));
        Self {
            backend,
            drafts,
            settings,
            fsm: Mutex::new(LinkMachine::new()),
            pending: Mutex::new(None),
            debounce,
        }
    }

    /// Current flow state.
    pub fn state(&self) -> LinkResult<LinkState> {
        let fsm = self
            .fsm
            .lock()
            .map_err(|_| LinkError::InvalidStateTransition("state lock poisoned".to_string()))?;
        Ok(LinkState::from(fsm.state()))
    }

    fn transition(&self, input: &LinkMachineInput) -> LinkResult<LinkState> {
        let mut fsm = self
            .fsm
            .lock()
            .map_err(|_| LinkError::InvalidStateTransition("state lock poisoned".to_string()))?;
        let old = LinkState::from(fsm.state());
        fsm.consume(input).map_err(|_| {
            LinkError::InvalidStateTransition(format!("{:?} is not legal in {:?}", input, old))
        })?;
        let new = LinkState::from(fsm.state());
        debug!(?old, ?new, "link flow transition");
        Ok(new)
    }

    fn replace_pending(&self, draft: Option<ConsentDraft>) -> LinkResult<Option<ConsentDraft>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| LinkError::InvalidStateTransition("draft lock poisoned".to_string()))?;
        Ok(std::mem::replace(&mut *pending, draft))
    }

    /// Debounced advisory duplicate check for the identifier being typed.
    ///
    /// Returns `None` when a newer keystroke superseded this one, otherwise
    /// whether the identifier is already linked.
    pub async fn check_identifier(&self, identifier: &str) -> Option<LinkResult<bool>> {
        let identifier = identifier.trim().to_string();
        self.debounce
            .submit(|| async move {
                let linked = self.backend.linked_accounts().await?;
                Ok(linked
                    .iter()
                    .any(|a| a.username.eq_ignore_ascii_case(&identifier)))
            })
            .await
    }

    /// Validate and accept a new draft.
    ///
    /// Validation failures are raised before any network call; the duplicate
    /// check against the linked-account list is authoritative here, unlike
    /// the advisory [`check_identifier`](Self::check_identifier).
    pub async fn submit_draft(
        &self,
        identifier: &str,
        consent_given: bool,
    ) -> LinkResult<ConsentDraft> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(LinkError::Validation(
                "account identifier must not be empty".to_string(),
            ));
        }
        if !consent_given {
            return Err(LinkError::Validation(
                "the monitored subject's consent is required".to_string(),
            ));
        }

        let linked = self.backend.linked_accounts().await?;
        if linked
            .iter()
            .any(|a| a.username.eq_ignore_ascii_case(identifier))
        {
            return Err(LinkError::DuplicateIdentifier(identifier.to_string()));
        }

        let draft = ConsentDraft::new(identifier, consent_given);
        self.transition(&LinkMachineInput::DraftAccepted)?;
        self.replace_pending(Some(draft.clone()))?;
        info!(draft_id = %draft.draft_id, identifier, "consent draft accepted");
        Ok(draft)
    }

    /// Persist the pending draft and build the provider authorization URL.
    ///
    /// The draft id rides along as the `state` parameter so the callback can
    /// be correlated after the navigation.
    pub fn begin_redirect(&self) -> LinkResult<Url> {
        let draft = self.replace_pending(None)?.ok_or_else(|| {
            LinkError::InvalidStateTransition("no draft pending".to_string())
        })?;

        self.drafts.save(&draft)?;
        if let Err(e) = self.transition(&LinkMachineInput::RedirectStarted) {
            self.drafts.clear()?;
            self.replace_pending(Some(draft))?;
            return Err(e);
        }

        let mut url = Url::parse(&self.settings.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", &self.settings.scopes)
            .append_pair("response_type", "code")
            .append_pair("state", &draft.draft_id);

        info!(draft_id = %draft.draft_id, "handing off to provider");
        Ok(url)
    }

    /// Re-enter the flow from the provider callback after the navigation.
    ///
    /// Consumes the persisted draft exactly once; a replayed callback with
    /// the same correlation token is rejected as stale with nothing else
    /// touched. Validation order: provider error, missing parameters,
    /// correlation, consent.
    pub fn resume(&self, callback_url: &str) -> LinkResult<LinkRequest> {
        let params = CallbackParams::from_url(callback_url)?;

        // A fresh process starts in Idle; replay the persisted draft's path
        // so the callback is judged from Redirected.
        if self.state()? == LinkState::Idle && self.drafts.load()?.is_some() {
            self.transition(&LinkMachineInput::DraftAccepted)?;
            self.transition(&LinkMachineInput::RedirectStarted)?;
        }

        if let Some(error) = params.error {
            return self.fail_callback(format!("provider returned error '{}'", error));
        }
        let state_token = match params.state {
            Some(token) => token,
            None => return self.fail_callback("missing state parameter".to_string()),
        };
        let code = match params.code {
            Some(code) => code,
            None => return self.fail_callback("missing authorization code".to_string()),
        };

        let draft = match self.drafts.take(&state_token)? {
            Some(draft) => draft,
            None => {
                warn!(state_token, "callback matched no pending draft");
                let _ = self.transition(&LinkMachineInput::CallbackInvalid);
                return Err(LinkError::StaleCallback);
            }
        };
        if !draft.consent_given {
            return self.fail_callback("draft lacks subject consent".to_string());
        }

        self.transition(&LinkMachineInput::CallbackReturned)?;
        debug!(draft_id = %draft.draft_id, "callback accepted, ready to exchange");
        Ok(LinkRequest {
            code,
            draft_id: draft.draft_id,
            subject_identifier: draft.subject_identifier,
        })
    }

    fn fail_callback<T>(&self, reason: String) -> LinkResult<T> {
        warn!(%reason, "provider callback rejected");
        self.drafts.clear()?;
        let _ = self.transition(&LinkMachineInput::CallbackInvalid);
        Err(LinkError::CallbackInvalid(reason))
    }

    /// Exchange the authorization code for a linked account.
    ///
    /// The draft was already consumed by [`resume`](Self::resume), so a
    /// failed exchange cannot be retried with the same code; the flow ends
    /// in Failed and a new draft starts over.
    pub async fn exchange(&self, request: LinkRequest) -> LinkResult<LinkedAccount> {
        if self.state()? != LinkState::Exchanging {
            return Err(LinkError::InvalidStateTransition(
                "no exchange in progress".to_string(),
            ));
        }

        match self
            .backend
            .exchange_code(&request.code, &request.subject_identifier)
            .await
        {
            Ok(response) => {
                self.transition(&LinkMachineInput::ExchangeSucceeded)?;
                info!(
                    account_id = %response.linked_account.id,
                    username = %response.linked_account.username,
                    "account linked"
                );
                Ok(response.linked_account)
            }
            Err(e) => {
                let _ = self.transition(&LinkMachineInput::ExchangeFailed);
                match e {
                    TransportError::Api { status, message } if status < 500 => {
                        Err(LinkError::ExchangeRejected(format!(
                            "HTTP {}: {}",
                            status, message
                        )))
                    }
                    other => Err(LinkError::Transport(other)),
                }
            }
        }
    }

    /// Abandon the flow before the exchange. Discards the draft.
    pub fn abandon(&self) -> LinkResult<()> {
        self.transition(&LinkMachineInput::Declined)?;
        self.replace_pending(None)?;
        self.drafts.clear()?;
        info!("link flow abandoned");
        Ok(())
    }
}
