//! Process-wide registry of live connection workers.
//!
//! # Responsibilities
//! - Count workers whose run loop has started but not yet exited
//! - Hand out guards that release their slot on drop, on every exit path
//! - Let shutdown wait for the count to drain
//!
//! # Design Decisions
//! - The count is advisory: a read may be stale the instant it returns
//! - Draining polls with a short sleep plus a cooperative yield

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Tracks live connection workers.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    live: Arc<AtomicUsize>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting worker. The returned guard deregisters it on drop.
    pub fn enter(&self) -> WorkerGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_live_workers(live);
        WorkerGuard {
            live: Arc::clone(&self.live),
        }
    }

    /// Current number of live workers.
    pub fn count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait until no worker is live, or `timeout` elapses.
    ///
    /// Returns `true` if the registry drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        let mut remaining = self.count();
        while remaining > 0 {
            if started.elapsed() > timeout {
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            tokio::task::yield_now().await;
            remaining = self.count();
        }
        tracing::debug!(remaining, "wait_for_drain finished");
        remaining == 0
    }
}

/// Slot held by one running worker.
#[derive(Debug)]
pub struct WorkerGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_live_workers(live);
    }
}
