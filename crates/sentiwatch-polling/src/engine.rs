//! Polling engine with per-source delta detection.

use crate::delta::{advance_baseline, new_item_count};
use crate::{PollError, PollResult};
use sentiwatch_transport::{ItemRecord, TransportResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The fetch seam between the engine and the backend.
pub trait SourceFetcher: Send + Sync + 'static {
    /// Fetch the current items for a source.
    fn fetch_items(
        &self,
        source_id: &str,
    ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send;

    /// Ask the origin to pull fresh items for a source right now.
    fn refresh_now(
        &self,
        source_id: &str,
    ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send;
}

/// Outcome of one completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    Success,
    Error(String),
}

/// One polling observation, delivered to the subscriber and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTick {
    pub source_id: String,
    /// Items that appeared since the previous successful fetch
    pub new_item_count: u64,
    /// Total items observed (last known total on error ticks)
    pub total_count: u64,
    pub status: TickStatus,
}

/// Per-source runtime shared by the scheduled loop and manual fetches.
struct SourceRuntime {
    /// Guards against a fetch starting while another is still running
    in_flight: AtomicBool,
    /// Item count of the last completed successful fetch
    baseline: Mutex<Option<u64>>,
}

impl SourceRuntime {
    fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            baseline: Mutex::new(None),
        }
    }

    /// Claim the fetch slot. Returns false when a fetch is already running.
    fn begin(&self) -> bool {
        !self.in_flight.swap(true, Ordering::SeqCst)
    }

    fn finish(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

struct SourceEntry {
    runtime: Arc<SourceRuntime>,
    cancel: Arc<AtomicBool>,
    abort: AbortHandle,
}

type Registry = Arc<Mutex<HashMap<String, SourceEntry>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<String, SourceEntry>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Schedules periodic fetches for independently monitored sources.
///
/// Each source runs in its own task: an immediate first fetch, then a fixed
/// interval. A fetch still in flight when the next tick fires causes that
/// tick to be skipped rather than overlapped, and a failed fetch leaves the
/// baseline where the last success put it.
pub struct PollingEngine<F: SourceFetcher> {
    fetcher: Arc<F>,
    sources: Registry,
}

impl<F: SourceFetcher> PollingEngine<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self {
            fetcher,
            sources: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Begin monitoring a source at the given interval.
    ///
    /// The first fetch happens immediately. Returns the subscription that
    /// receives this source's ticks; dropping or stopping it ends the
    /// monitoring.
    pub fn start_monitoring(
        &self,
        source_id: &str,
        interval: Duration,
    ) -> PollResult<PollSubscription> {
        let mut sources = lock_registry(&self.sources);
        if sources.contains_key(source_id) {
            return Err(PollError::AlreadyMonitoring(source_id.to_string()));
        }

        let runtime = Arc::new(SourceRuntime::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel(32);

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.fetcher),
            source_id.to_string(),
            interval,
            Arc::clone(&runtime),
            Arc::clone(&cancel),
            sender,
        ));

        sources.insert(
            source_id.to_string(),
            SourceEntry {
                runtime,
                cancel: Arc::clone(&cancel),
                abort: handle.abort_handle(),
            },
        );
        info!(source_id, ?interval, "monitoring started");

        Ok(PollSubscription {
            source_id: source_id.to_string(),
            receiver,
            cancel,
            abort: handle.abort_handle(),
            registry: Arc::clone(&self.sources),
            stopped: false,
        })
    }

    /// Fetch a monitored source out of band, updating its baseline.
    ///
    /// Shares the in-flight guard with the scheduled loop, so the next
    /// scheduled tick reports zero for items this fetch already counted and
    /// never overlaps it.
    pub async fn fetch_now(&self, source_id: &str) -> PollResult<PollTick> {
        let runtime = {
            let sources = lock_registry(&self.sources);
            let entry = sources
                .get(source_id)
                .ok_or_else(|| PollError::UnknownSource(source_id.to_string()))?;
            Arc::clone(&entry.runtime)
        };

        if !runtime.begin() {
            return Err(PollError::FetchInProgress(source_id.to_string()));
        }
        let result = self.fetcher.refresh_now(source_id).await;
        let tick = settle(source_id, &runtime, result);
        runtime.finish();
        Ok(tick)
    }

    /// Whether a source is currently monitored.
    pub fn is_monitoring(&self, source_id: &str) -> bool {
        lock_registry(&self.sources).contains_key(source_id)
    }

    /// Number of currently monitored sources.
    pub fn monitored_count(&self) -> usize {
        lock_registry(&self.sources).len()
    }

    /// Stop every monitored source.
    pub fn stop_all(&self) {
        let mut sources = lock_registry(&self.sources);
        for (source_id, entry) in sources.drain() {
            entry.cancel.store(true, Ordering::SeqCst);
            entry.abort.abort();
            debug!(%source_id, "monitoring stopped");
        }
    }
}

/// Subscription to one source's ticks.
pub struct PollSubscription {
    source_id: String,
    receiver: mpsc::Receiver<PollTick>,
    cancel: Arc<AtomicBool>,
    abort: AbortHandle,
    registry: Registry,
    stopped: bool,
}

impl PollSubscription {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Receive the next tick. Returns `None` once monitoring has stopped.
    pub async fn next_tick(&mut self) -> Option<PollTick> {
        self.receiver.recv().await
    }

    /// Stop monitoring this source.
    ///
    /// When this returns, no further tick will be delivered: the polling
    /// task is cancelled and anything already buffered is discarded.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.cancel.store(true, Ordering::SeqCst);
        self.abort.abort();
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
        lock_registry(&self.registry).remove(&self.source_id);
        debug!(source_id = %self.source_id, "subscription stopped");
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The per-source polling task.
async fn poll_loop<F: SourceFetcher>(
    fetcher: Arc<F>,
    source_id: String,
    interval: Duration,
    runtime: Arc<SourceRuntime>,
    cancel: Arc<AtomicBool>,
    sender: mpsc::Sender<PollTick>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        if !runtime.begin() {
            debug!(%source_id, "fetch still in flight, skipping tick");
            continue;
        }

        let result = fetcher.fetch_items(&source_id).await;
        let tick = settle(&source_id, &runtime, result);
        runtime.finish();

        if cancel.load(Ordering::SeqCst) {
            break;
        }
        if sender.send(tick).await.is_err() {
            break;
        }
    }
}

/// Turn a fetch result into a tick, updating the baseline on success.
fn settle(
    source_id: &str,
    runtime: &SourceRuntime,
    result: TransportResult<Vec<ItemRecord>>,
) -> PollTick {
    let mut baseline = runtime
        .baseline
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    match result {
        Ok(items) => {
            let current = items.len() as u64;
            // The first fetch establishes the baseline; nothing it sees
            // counts as new.
            let new_items = match *baseline {
                Some(last) => new_item_count(current, last),
                None => 0,
            };
            *baseline = Some(advance_baseline(current));
            debug!(source_id, total = current, new_items, "fetch completed");
            PollTick {
                source_id: source_id.to_string(),
                new_item_count: new_items,
                total_count: current,
                status: TickStatus::Success,
            }
        }
        Err(e) => {
            warn!(source_id, error = %e, "fetch failed, baseline unchanged");
            PollTick {
                source_id: source_id.to_string(),
                new_item_count: 0,
                total_count: baseline.unwrap_or(0),
                status: TickStatus::Error(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentiwatch_transport::{Sentiment, TransportError};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

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

    struct Script {
        steps: VecDeque<Result<u64, String>>,
        last: Result<u64, String>,
        delay: Option<Duration>,
    }

    /// Scripted fetcher: plays back per-source step lists, repeating the
    /// final step once exhausted.
    struct MockFetcher {
        scripts: Mutex<HashMap<String, Script>>,
        calls: AtomicU32,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: AtomicU32::new(0),
            }
        }

        fn script(self, source_id: &str, steps: Vec<Result<u64, String>>) -> Self {
            self.script_with_delay(source_id, steps, None)
        }

        fn script_with_delay(
            self,
            source_id: &str,
            steps: Vec<Result<u64, String>>,
            delay: Option<Duration>,
        ) -> Self {
            let last = steps.last().cloned().unwrap_or(Ok(0));
            self.scripts.lock().unwrap().insert(
                source_id.to_string(),
                Script {
                    steps: steps.into(),
                    last,
                    delay,
                },
            );
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_step(&self, source_id: &str) -> (Result<u64, String>, Option<Duration>) {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.get_mut(source_id).expect("unscripted source");
            let step = script.steps.pop_front().unwrap_or_else(|| script.last.clone());
            (step, script.delay)
        }

        fn run(
            &self,
            source_id: &str,
        ) -> impl Future<Output = TransportResult<Vec<ItemRecord>>> + Send + '_ {
            let (step, delay) = self.next_step(source_id);
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
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

    impl SourceFetcher for MockFetcher {
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

    #[tokio::test(start_paused = true)]
    async fn first_fetch_is_immediate_and_establishes_baseline() {
        let fetcher = Arc::new(MockFetcher::new().script("acct-1", vec![Ok(3)]));
        let engine = PollingEngine::new(fetcher);
        let mut sub = engine.start_monitoring("acct-1", INTERVAL).unwrap();

        let tick = sub.next_tick().await.unwrap();
        assert_eq!(tick.source_id, "acct-1");
        assert_eq!(tick.total_count, 3);
        assert_eq!(tick.new_item_count, 0);
        assert_eq!(tick.status, TickStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn growth_between_ticks_is_reported_once() {
        let fetcher = Arc::new(MockFetcher::new().script("acct-1", vec![Ok(3), Ok(5), Ok(5)]));
        let engine = PollingEngine::new(fetcher);
        let mut sub = engine.start_monitoring("acct-1", INTERVAL).unwrap();

        assert_eq!(sub.next_tick().await.unwrap().new_item_count, 0);

        let second = sub.next_tick().await.unwrap();
        assert_eq!(second.new_item_count, 2);
        assert_eq!(second.total_count, 5);

        // Baseline advanced to 5; the same total is no longer new
        assert_eq!(sub.next_tick().await.unwrap().new_item_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_keeps_baseline() {
        let fetcher = Arc::new(MockFetcher::new().script(
            "acct-1",
            vec![Ok(3), Err("unavailable".to_string()), Ok(5)],
        ));
        let engine = PollingEngine::new(fetcher);
        let mut sub = engine.start_monitoring("acct-1", INTERVAL).unwrap();

        assert_eq!(sub.next_tick().await.unwrap().new_item_count, 0);

        let error_tick = sub.next_tick().await.unwrap();
        assert!(matches!(error_tick.status, TickStatus::Error(_)));
        assert_eq!(error_tick.total_count, 3);
        assert_eq!(error_tick.new_item_count, 0);

        // Next success reports everything since the last success
        let recovered = sub.next_tick().await.unwrap();
        assert_eq!(recovered.new_item_count, 2);
        assert_eq!(recovered.total_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_skips_overlapping_ticks() {
        // Each fetch takes 12s against a 5s interval
        let fetcher = Arc::new(MockFetcher::new().script_with_delay(
            "acct-1",
            vec![Ok(3), Ok(5)],
            Some(Duration::from_secs(12)),
        ));
        let engine = PollingEngine::new(Arc::clone(&fetcher));
        let mut sub = engine.start_monitoring("acct-1", INTERVAL).unwrap();

        let first = sub.next_tick().await.unwrap();
        assert_eq!(first.total_count, 3);
        let second = sub.next_tick().await.unwrap();
        assert_eq!(second.total_count, 5);
        assert_eq!(second.new_item_count, 2);

        // Two completed fetches, no extra ones for the skipped ticks
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_delivers_nothing_afterwards() {
        let fetcher = Arc::new(MockFetcher::new().script("acct-1", vec![Ok(3)]));
        let engine = PollingEngine::new(fetcher);
        let mut sub = engine.start_monitoring("acct-1", INTERVAL).unwrap();

        sub.next_tick().await.unwrap();
        sub.stop();

        assert_eq!(sub.next_tick().await, None);
        assert!(!engine.is_monitoring("acct-1"));

        // Later ticks never surface
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sub.next_tick().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_isolated() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .script_with_delay("slow", vec![Ok(1)], Some(Duration::from_secs(30)))
                .script("fast", vec![Ok(1), Ok(2), Ok(3)]),
        );
        let engine = PollingEngine::new(fetcher);
        let mut slow = engine.start_monitoring("slow", INTERVAL).unwrap();
        let mut fast = engine.start_monitoring("fast", INTERVAL).unwrap();

        // The fast source keeps ticking while the slow one is stuck
        assert_eq!(fast.next_tick().await.unwrap().total_count, 1);
        assert_eq!(fast.next_tick().await.unwrap().total_count, 2);
        assert_eq!(fast.next_tick().await.unwrap().total_count, 3);

        assert_eq!(slow.next_tick().await.unwrap().total_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_fetch_updates_baseline() {
        // Long interval: only the immediate first tick is scheduled early
        let fetcher =
            Arc::new(MockFetcher::new().script("acct-1", vec![Ok(3), Ok(5), Ok(5)]));
        let engine = PollingEngine::new(fetcher);
        let mut sub = engine
            .start_monitoring("acct-1", Duration::from_secs(60))
            .unwrap();

        assert_eq!(sub.next_tick().await.unwrap().total_count, 3);

        let manual = engine.fetch_now("acct-1").await.unwrap();
        assert_eq!(manual.new_item_count, 2);
        assert_eq!(manual.total_count, 5);

        // The next scheduled tick does not double-report the manual items
        let scheduled = sub.next_tick().await.unwrap();
        assert_eq!(scheduled.total_count, 5);
        assert_eq!(scheduled.new_item_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_fetch_rejected_while_fetch_in_flight() {
        let fetcher = Arc::new(MockFetcher::new().script_with_delay(
            "acct-1",
            vec![Ok(3)],
            Some(Duration::from_secs(10)),
        ));
        let engine = Arc::new(PollingEngine::new(fetcher));
        let mut sub = engine
            .start_monitoring("acct-1", Duration::from_secs(1000))
            .unwrap();

        // Let the immediate scheduled fetch finish
        sub.next_tick().await.unwrap();

        let background = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.fetch_now("acct-1").await })
        };
        // Give the background fetch time to claim the slot
        tokio::time::sleep(Duration::from_secs(1)).await;

        let result = engine.fetch_now("acct-1").await;
        assert!(matches!(result, Err(PollError::FetchInProgress(_))));

        background.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_now_requires_monitoring() {
        let fetcher = Arc::new(MockFetcher::new());
        let engine = PollingEngine::new(fetcher);

        let result = engine.fetch_now("nobody").await;
        assert!(matches!(result, Err(PollError::UnknownSource(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_monitoring_is_rejected() {
        let fetcher = Arc::new(MockFetcher::new().script("acct-1", vec![Ok(1)]));
        let engine = PollingEngine::new(fetcher);
        let _sub = engine.start_monitoring("acct-1", INTERVAL).unwrap();

        let result = engine.start_monitoring("acct-1", INTERVAL);
        assert!(matches!(result, Err(PollError::AlreadyMonitoring(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_cancels_every_source() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .script("a", vec![Ok(1)])
                .script("b", vec![Ok(2)]),
        );
        let engine = PollingEngine::new(fetcher);
        let mut sub_a = engine.start_monitoring("a", INTERVAL).unwrap();
        let mut sub_b = engine.start_monitoring("b", INTERVAL).unwrap();

        sub_a.next_tick().await.unwrap();
        sub_b.next_tick().await.unwrap();

        engine.stop_all();
        assert_eq!(engine.monitored_count(), 0);

        // Channels end once the cancelled tasks are gone
        assert_eq!(sub_a.next_tick().await, None);
        assert_eq!(sub_b.next_tick().await, None);
    }
}
