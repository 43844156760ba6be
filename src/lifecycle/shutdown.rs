//! Shutdown coordination.
//!
//! Stopping is two-phase: the acceptor stops handing out connections when
//! the trigger fires, then the caller waits (bounded) for live workers to
//! finish on their own timeouts. Workers are never cancelled.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::lifecycle::registry::WorkerRegistry;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that the accept loop and other long-running
/// tasks subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of subscribers still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for live workers to finish, logging the outcome.
pub async fn drain_workers(registry: &WorkerRegistry, timeout: Duration) -> bool {
    let live = registry.count();
    if live > 0 {
        tracing::info!(live_workers = live, timeout_ms = timeout.as_millis() as u64, "Draining workers");
    }
    let drained = registry.wait_for_drain(timeout).await;
    if !drained {
        tracing::warn!(remaining = registry.count(), "Workers still running after drain timeout");
    }
    drained
}

/// Wait for Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
