//! Dashboard-level aggregation of per-source polling.

use sentiwatch_polling::{PollResult, PollTick, PollingEngine, SourceFetcher, TickStatus};
use sentiwatch_transport::SessionEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One aggregated dashboard update, published per meaningful tick.
#[derive(Debug, Clone)]
pub struct DashboardUpdate {
    pub source_id: String,
    /// Items this tick found that were not known before
    pub new_item_count: u64,
    /// Unread items accumulated for this source
    pub unread_for_source: u64,
    /// Unread items accumulated across all sources
    pub total_unread: u64,
    /// Set when the tick failed; counts are unchanged then
    pub error: Option<String>,
}

type UnreadCounts = Arc<Mutex<HashMap<String, u64>>>;

fn lock_unread(unread: &UnreadCounts) -> MutexGuard<'_, HashMap<String, u64>> {
    unread.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Folds every monitored source's ticks into one update stream.
///
/// Each tick's items are counted exactly once: the engine's baseline
/// de-duplicates across ticks and manual fetches, and the coordinator only
/// accumulates what a tick reports as new. A terminated session stops all
/// monitoring and resets the counts in the same step.
pub struct DashboardCoordinator<F: SourceFetcher> {
    engine: Arc<PollingEngine<F>>,
    interval: Duration,
    unread: UnreadCounts,
    updates: broadcast::Sender<DashboardUpdate>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl<F: SourceFetcher> DashboardCoordinator<F> {
    pub fn new(engine: Arc<PollingEngine<F>>, interval: Duration) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            engine,
            interval,
            unread: Arc::new(Mutex::new(HashMap::new())),
            updates,
            forwarders: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to aggregated updates.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.updates.subscribe()
    }

    /// Begin monitoring the given sources.
    pub fn start(&self, source_ids: &[String]) -> PollResult<()> {
        let mut forwarders = self
            .forwarders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for source_id in source_ids {
            let mut subscription = self.engine.start_monitoring(source_id, self.interval)?;
            let unread = Arc::clone(&self.unread);
            let updates = self.updates.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(tick) = subscription.next_tick().await {
                    apply_tick(&unread, &updates, &tick);
                }
            }));
        }
        info!(sources = source_ids.len(), "dashboard monitoring started");
        Ok(())
    }

    /// Fetch one source out of band. Counts flow through the same baseline
    /// as scheduled ticks, so nothing is reported twice.
    pub async fn fetch_now(&self, source_id: &str) -> PollResult<PollTick> {
        let tick = self.engine.fetch_now(source_id).await?;
        apply_tick(&self.unread, &self.updates, &tick);
        Ok(tick)
    }

    /// Mark a source's unread items as seen.
    pub fn acknowledge(&self, source_id: &str) {
        lock_unread(&self.unread).remove(source_id);
    }

    /// Unread items accumulated across all sources.
    pub fn total_unread(&self) -> u64 {
        lock_unread(&self.unread).values().sum()
    }

    /// Number of sources currently monitored.
    pub fn monitored_count(&self) -> usize {
        self.engine.monitored_count()
    }

    /// Stop all monitoring and reset counts.
    pub fn stop(&self) {
        self.engine.stop_all();
        lock_unread(&self.unread).clear();
        let mut forwarders = self
            .forwarders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for handle in forwarders.drain(..) {
            handle.abort();
        }
    }

    /// Watch for session termination and tear monitoring down with it.
    pub fn watch_session(
        &self,
        mut events: broadcast::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let unread = Arc::clone(&self.unread);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Terminated) => {
                        warn!("session terminated, stopping all monitoring");
                        engine.stop_all();
                        lock_unread(&unread).clear();
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn apply_tick(
    unread: &UnreadCounts,
    updates: &broadcast::Sender<DashboardUpdate>,
    tick: &PollTick,
) {
    let (new_items, error) = match &tick.status {
        TickStatus::Success => (tick.new_item_count, None),
        TickStatus::Error(message) => (0, Some(message.clone())),
    };

    let mut counts = lock_unread(unread);
    let per_source = {
        let entry = counts.entry(tick.source_id.clone()).or_insert(0);
        *entry += new_items;
        *entry
    };
    let total: u64 = counts.values().sum();
    drop(counts);

    if new_items == 0 && error.is_none() {
        return;
    }
    // No subscribers is fine; the counts are already folded in.
    let _ = updates.send(DashboardUpdate {
        source_id: tick.source_id.clone(),
        new_item_count: new_items,
        unread_for_source: per_source,
        total_unread: total,
        error,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentiwatch_store::{CredentialPair, MemoryStore, SessionMeta, TokenStore};
    use sentiwatch_transport::{
        AuthTransport, ItemRecord, Sentiment, TransportError, TransportResult,
    };
    use std::collections::VecDeque;
    use std::future::Future;

    const INTERVAL: Duration = Duration::from_secs(5);

    fn make_items(count: u64) -> Vec<ItemRecord> {
        (0..count)
            .map(|i| ItemRecord {
                id: format!("item-{}", i),
                text: format!("comment {}", i),
                sentiment: Sentiment::Neutral,
                created_at: "2026-01-05T10:00:00Z".to_string(),
            })
            .collect()
    }

    /// Plays back per-source count sequences, repeating the final entry.
    struct ScriptedFetcher {
        scripts: Mutex<HashMap<String, VecDeque<Result<u64, String>>>>,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
            }
        }

        fn script(self, source_id: &str, steps: Vec<Result<u64, String>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(source_id.to_string(), steps.into());
            self
        }

        fn next(&self, source_id: &str) -> Result<u64, String> {
            let mut scripts = self.scripts.lock().unwrap();
            let steps = scripts.get_mut(source_id).expect("unscripted source");
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                steps.front().cloned().unwrap_or(Ok(0))
            }
        }

        fn run(
            &self,
            source_id: &str,
        ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send + '_ {
            let step = self.next(source_id);
            async move {
                match step {
                    Ok(count) => Ok(make_items(count)),
                    Err(message) => Err(TransportError::Api {
                        status: 503,
                        message,
                    }),
                }
            }
        }
    }

    impl SourceFetcher for ScriptedFetcher {
        fn fetch_items(
            &self,
            source_id: &str,
        ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send {
            self.run(source_id)
        }

        fn refresh_now(
            &self,
            source_id: &str,
        ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send {
            self.run(source_id)
        }
    }

    fn coordinator_with(
        fetcher: ScriptedFetcher,
        interval: Duration,
    ) -> DashboardCoordinator<ScriptedFetcher> {
        DashboardCoordinator::new(Arc::new(PollingEngine::new(Arc::new(fetcher))), interval)
    }

    #[tokio::test(start_paused = true)]
    async fn updates_aggregate_across_sources() {
        let fetcher = ScriptedFetcher::new()
            .script("a", vec![Ok(3), Ok(5), Ok(5)])
            .script("b", vec![Ok(1), Ok(2), Ok(2)]);
        let coordinator = coordinator_with(fetcher, INTERVAL);
        let mut updates = coordinator.subscribe_updates();

        coordinator
            .start(&["a".to_string(), "b".to_string()])
            .unwrap();

        // First fetches establish baselines silently; the second round
        // produces one update per grown source.
        let mut seen = HashMap::new();
        for _ in 0..2 {
            let update = updates.recv().await.unwrap();
            assert!(update.error.is_none());
            seen.insert(update.source_id.clone(), update.new_item_count);
        }
        assert_eq!(seen.get("a"), Some(&2));
        assert_eq!(seen.get("b"), Some(&1));
        assert_eq!(coordinator.total_unread(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn error_ticks_surface_without_counting() {
        let fetcher =
            ScriptedFetcher::new().script("a", vec![Ok(3), Err("unavailable".to_string())]);
        let coordinator = coordinator_with(fetcher, INTERVAL);
        let mut updates = coordinator.subscribe_updates();

        coordinator.start(&["a".to_string()]).unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.error.as_deref(), Some("API error: HTTP 503: unavailable"));
        assert_eq!(update.new_item_count, 0);
        assert_eq!(coordinator.total_unread(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_fetch_is_not_double_counted() {
        // Long interval: only the immediate tick is scheduled early
        let fetcher = ScriptedFetcher::new().script("a", vec![Ok(3), Ok(5), Ok(5)]);
        let coordinator = coordinator_with(fetcher, Duration::from_secs(3600));

        coordinator.start(&["a".to_string()]).unwrap();
        // Let the immediate first fetch land
        tokio::time::sleep(Duration::from_secs(1)).await;

        let manual = coordinator.fetch_now("a").await.unwrap();
        assert_eq!(manual.new_item_count, 2);
        assert_eq!(coordinator.total_unread(), 2);

        // The next scheduled tick sees the same total and adds nothing
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(coordinator.total_unread(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_clears_a_source() {
        let fetcher = ScriptedFetcher::new().script("a", vec![Ok(0), Ok(4), Ok(4)]);
        let coordinator = coordinator_with(fetcher, INTERVAL);
        let mut updates = coordinator.subscribe_updates();

        coordinator.start(&["a".to_string()]).unwrap();
        updates.recv().await.unwrap();
        assert_eq!(coordinator.total_unread(), 4);

        coordinator.acknowledge("a");
        assert_eq!(coordinator.total_unread(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_termination_stops_all_monitoring() {
        let fetcher = ScriptedFetcher::new()
            .script("a", vec![Ok(1)])
            .script("b", vec![Ok(1)]);
        let coordinator = coordinator_with(fetcher, INTERVAL);
        coordinator
            .start(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(coordinator.monitored_count(), 2);

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
        let transport = AuthTransport::new("http://127.0.0.1:9/api", tokens);
        let watcher = coordinator.watch_session(transport.subscribe_session_events());

        transport.terminate_session("refresh rejected");
        watcher.await.unwrap();

        // Credentials cleared and every poll cancelled
        assert!(transport.tokens().get().unwrap().is_none());
        assert_eq!(coordinator.monitored_count(), 0);
        assert_eq!(coordinator.total_unread(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_everything() {
        let fetcher = ScriptedFetcher::new().script("a", vec![Ok(0), Ok(2), Ok(2)]);
        let coordinator = coordinator_with(fetcher, INTERVAL);
        let mut updates = coordinator.subscribe_updates();

        coordinator.start(&["a".to_string()]).unwrap();
        updates.recv().await.unwrap();

        coordinator.stop();
        assert_eq!(coordinator.monitored_count(), 0);
        assert_eq!(coordinator.total_unread(), 0);
    }
}
