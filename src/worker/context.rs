//! Current execution context of a connection worker.
//!
//! Bound after the socket is acquired and released when the worker's state
//! machine ends, before cleanup. Downstream code (dispatchers, storage
//! layers) can read it to learn which worker and connection it runs for.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::net::connection::ConnectionId;

tokio::task_local! {
    static CURRENT_WORKER: WorkerContext;
}

/// Unique identifier for a connection worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    pub worker_id: WorkerId,
    pub connection_id: ConnectionId,
    pub peer: Option<SocketAddr>,
}

/// Context of the worker running the current task, if any.
pub fn current_worker() -> Option<WorkerContext> {
    CURRENT_WORKER.try_with(|ctx| *ctx).ok()
}

/// Run `future` with `ctx` as the current worker context.
pub(crate) async fn scope<F: Future>(ctx: WorkerContext, future: F) -> F::Output {
    CURRENT_WORKER.scope(ctx, future).await
}
