//! HTTP server: accept loop feeding connection workers.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Start one `ConnectionWorker` task per connection
//! - Stop accepting on shutdown, then wait for live workers to drain

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::lifecycle::shutdown::drain_workers;
use crate::lifecycle::WorkerServices;
use crate::net::listener::{Listener, ListenerError};
use crate::net::socket::TcpDescriptor;
use crate::upgrade::UpgradeTarget;
use crate::worker::{Application, ConnectionWorker};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Serves HTTP/1.x connections with one worker per connection.
pub struct HttpServer<D, U> {
    config: ServerConfig,
    services: Arc<WorkerServices>,
    app: Application<D, U>,
}

impl<D, U> HttpServer<D, U>
where
    D: Dispatcher,
    U: UpgradeTarget,
{
    pub fn new(config: ServerConfig, services: Arc<WorkerServices>, app: Application<D, U>) -> Self {
        let app = app.with_session_cookie(config.session.cookie_name.clone());
        Self {
            config,
            services,
            app,
        }
    }

    /// Run until `shutdown` fires. Returns whether all workers drained in time.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> bool {
        let max_workers = self.config.worker.max_workers;
        let max_body = self.config.http.body_limit;
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, max_workers, "HTTP server starting"),
            Err(e) => tracing::warn!(error = %e, "HTTP server starting on unknown address"),
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (fd, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => match accept_retry_delay(&e) {
                            Some(delay) => {
                                tracing::warn!(error = %e, "Accept failed");
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                            None => {
                                tracing::error!(error = %e, "Listener unusable, no longer accepting");
                                break;
                            }
                        },
                    };
                    let worker = ConnectionWorker::new(
                        TcpDescriptor::new(fd, max_body),
                        max_workers,
                        Arc::clone(&self.services),
                        self.app.clone(),
                    );
                    tracing::trace!(worker_id = %worker.id(), peer = %peer, "Starting worker");
                    tokio::spawn(async move {
                        let _permit = permit;
                        worker.run().await
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        drop(listener);
        let timeout = Duration::from_millis(self.config.shutdown.drain_timeout_ms);
        let drained = drain_workers(self.services.registry(), timeout).await;
        tracing::info!(drained, "HTTP server stopped");
        drained
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// How long to wait before accepting again, or `None` when the listener
/// can no longer produce connections.
fn accept_retry_delay(error: &ListenerError) -> Option<Duration> {
    match error {
        ListenerError::Accept(_) => Some(ACCEPT_ERROR_BACKOFF),
        ListenerError::Bind(_) | ListenerError::Closed => None,
    }
}
