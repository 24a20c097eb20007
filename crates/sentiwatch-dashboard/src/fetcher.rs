//! Transport-backed source fetcher.

use sentiwatch_polling::SourceFetcher;
use sentiwatch_transport::{AuthTransport, ItemRecord, TransportResult};
use std::future::Future;
use std::sync::Arc;

/// Fetches items for linked accounts through the authenticated transport.
pub struct TransportFetcher {
    transport: Arc<AuthTransport>,
}

impl TransportFetcher {
    pub fn new(transport: Arc<AuthTransport>) -> Self {
        Self { transport }
    }
}

impl SourceFetcher for TransportFetcher {
    fn fetch_items(
        &self,
        source_id: &str,
    ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send {
        let transport = Arc::clone(&self.transport);
        let source_id = source_id.to_string();
        async move { transport.list_items(&source_id).await }
    }

    fn refresh_now(
        &self,
        source_id: &str,
    ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send {
        let transport = Arc::clone(&self.transport);
        let source_id = source_id.to_string();
        async move { transport.refresh_items(&source_id).await }
    }
}
