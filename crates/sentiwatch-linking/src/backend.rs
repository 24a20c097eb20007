//! Backend seam for the consent-link flow.

use sentiwatch_transport::{AuthTransport, ExchangeResponse, LinkedAccount, TransportResult};
use std::future::Future;

/// The remote calls the link flow depends on, behind a seam so the flow can
/// be driven against a scripted backend in tests.
pub trait LinkBackend: Send + Sync {
    /// Accounts already linked to this guardian.
    fn linked_accounts(&self) -> impl Future<Output = TransportResult<Vec<LinkedAccount>>> + Send;

    /// Exchange a provider authorization code for a linked account.
    fn exchange_code(
        &self,
        code: &str,
        subject_identifier: &str,
    ) -> impl Future<Output = TransportResult<ExchangeResponse>> + Send;
}

impl LinkBackend for AuthTransport {
    fn linked_accounts(&self) -> impl Future<Output = TransportResult<Vec<LinkedAccount>>> + Send {
        self.list_linked_accounts()
    }

    fn exchange_code(
        &self,
        code: &str,
        subject_identifier: &str,
    ) -> impl Future<Output = TransportResult<ExchangeResponse>> + Send {
        AuthTransport::exchange_code(self, code, subject_identifier)
    }
}
