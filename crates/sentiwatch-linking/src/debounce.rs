//! Debounced latest-wins lookups.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Coalesces a burst of inputs into one lookup for the latest of them.
///
/// Each `submit` claims a fresh generation, waits out the quiet window, and
/// runs the lookup only if no newer submission has arrived meanwhile. The
/// generation is re-checked after the lookup completes, so a slow lookup
/// whose input was superseded mid-flight is discarded on arrival rather
/// than delivered out of order.
pub struct DebouncedLookup {
    quiet: Duration,
    generation: AtomicU64,
}

impl DebouncedLookup {
    /// Create a debouncer with the given quiet window.
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule a lookup for the latest input.
    ///
    /// Returns `None` when this submission was superseded by a newer one,
    /// either during the quiet window or while the lookup was running.
    pub async fn submit<F, Fut, T>(&self, lookup: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let claimed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.quiet).await;
        if self.generation.load(Ordering::SeqCst) != claimed {
            tracing::trace!(generation = claimed, "lookup superseded during quiet window");
            return None;
        }

        let value = lookup().await;
        if self.generation.load(Ordering::SeqCst) != claimed {
            tracing::trace!(generation = claimed, "lookup superseded while running");
            return None;
        }
        Some(value)
    }

    /// Invalidate all pending submissions without scheduling a new one.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
