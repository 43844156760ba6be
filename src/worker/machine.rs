//! The connection state machine.
//!
//! ```text
//! acquire ──fail──────────────────────────────────────────► ErrorCleanup
//!    │
//!    ▼
//! Reading ──empty batch──► Closing ──► Terminated
//!    │                        ▲
//!    ▼                        │ keep-alive 0 / saturated / idle / peer gone
//! Dispatching ──► Deciding ───┤
//!    │   │                    └──► KeepAliveWait ──ready──► Reading
//!    │   └─ write failed ─────────────────────────────────► ErrorCleanup
//!    ▼
//! Upgrading ──transferred──► Terminated
//!           ──no endpoint──► Closing
//!           ──failed───────────────────────────────────────► ErrorCleanup
//! ```
//!
//! Every path ends in `ConnectionWorker::run`, which releases the socket,
//! clears the execution context and drops the registry guard once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::dispatch::{DispatchError, Dispatcher};
use crate::http::HttpRequest;
use crate::lifecycle::WorkerServices;
use crate::net::socket::{HttpSocket, SocketDescriptor};
use crate::observability::metrics;
use crate::session::SessionStore;
use crate::upgrade::{handshake, Handoff, UpgradeTarget};
use crate::worker::context::{self, WorkerContext, WorkerId};
use crate::worker::responder::Responder;
use crate::worker::state::{FailureKind, State, WorkerExit, WorkerReport};

/// Readiness poll slice while waiting for a request.
const READ_SLICE: Duration = Duration::from_millis(200);

/// Readiness poll slice while idling between requests.
const KEEP_ALIVE_SLICE: Duration = Duration::from_millis(5);

/// Cookie carrying the session id unless configured otherwise.
pub const DEFAULT_SESSION_COOKIE: &str = "session_id";

/// The application-facing collaborators shared by every worker.
pub struct Application<D, U> {
    dispatcher: Arc<D>,
    upgrade: Arc<U>,
    sessions: Arc<dyn SessionStore>,
    session_cookie: String,
}

impl<D, U> Application<D, U> {
    pub fn new(dispatcher: Arc<D>, upgrade: Arc<U>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            dispatcher,
            upgrade,
            sessions,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }

    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn upgrade(&self) -> &Arc<U> {
        &self.upgrade
    }
}

impl<D, U> Clone for Application<D, U> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            upgrade: Arc::clone(&self.upgrade),
            sessions: Arc::clone(&self.sessions),
            session_cookie: self.session_cookie.clone(),
        }
    }
}

/// Owns one accepted connection from acquisition to cleanup.
pub struct ConnectionWorker<F, D, U> {
    id: WorkerId,
    descriptor: F,
    max_workers: usize,
    services: Arc<WorkerServices>,
    app: Application<D, U>,
}

impl<F, D, U> ConnectionWorker<F, D, U>
where
    F: SocketDescriptor,
    D: Dispatcher,
    U: UpgradeTarget,
{
    /// `max_workers == 0` disables the keep-alive load-shedding check.
    pub fn new(
        descriptor: F,
        max_workers: usize,
        services: Arc<WorkerServices>,
        app: Application<D, U>,
    ) -> Self {
        Self {
            id: WorkerId::new(),
            descriptor,
            max_workers,
            services,
            app,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Run the worker on its own task.
    pub fn spawn(self) -> JoinHandle<WorkerReport> {
        tokio::spawn(self.run())
    }

    /// Drive the connection to completion. Never fails; the report says how
    /// it ended.
    pub async fn run(self) -> WorkerReport {
        let ConnectionWorker {
            id,
            descriptor,
            max_workers,
            services,
            app,
        } = self;

        let guard = services.registry().enter();
        let mut report = WorkerReport::new(id);

        let fd = descriptor.raw_fd();
        let socket = match descriptor.bind() {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(worker_id = %id, fd, error = %e, "Failed to acquire socket");
                report.exit = WorkerExit::Failed(FailureKind::AcquireFailed);
                finish(&report, None::<F::Socket>);
                drop(guard);
                return report;
            }
        };

        let ctx = WorkerContext {
            worker_id: id,
            connection_id: socket.connection_id(),
            peer: socket.peer_addr(),
        };
        tracing::debug!(
            worker_id = %id,
            connection_id = %ctx.connection_id,
            peer = ?ctx.peer,
            "Worker started"
        );

        let keep_alive = services.keep_alive().timeout();
        let mut machine = Machine {
            id,
            socket,
            max_workers,
            keep_alive,
            services: &services,
            app: &app,
            report: &mut report,
        };
        let exit = context::scope(ctx, machine.drive()).await;
        let socket = machine.socket;

        report.exit = exit;
        finish(&report, Some(socket));
        drop(guard);
        report
    }
}

/// Cleanup shared by every exit path. The socket is dropped here, without
/// further I/O.
fn finish<S: HttpSocket>(report: &WorkerReport, socket: Option<S>) {
    match (&report.exit, &socket) {
        (WorkerExit::Upgraded, Some(socket)) => tracing::debug!(
            worker_id = %report.worker_id,
            connection_id = %socket.connection_id(),
            "Releasing handle of transferred connection"
        ),
        (WorkerExit::Failed(kind), _) => tracing::debug!(
            worker_id = %report.worker_id,
            failure = ?kind,
            "Worker cleaning up after failure"
        ),
        _ => {}
    }
    drop(socket);

    metrics::record_worker_exit(report.exit.label());
    tracing::debug!(
        worker_id = %report.worker_id,
        exit = %report.exit,
        requests = report.requests_dispatched,
        keep_alive_waits = report.keep_alive_waits,
        "Worker finished"
    );
}

/// Per-run state borrowed from the worker.
struct Machine<'a, S, D, U> {
    id: WorkerId,
    socket: S,
    max_workers: usize,
    keep_alive: Duration,
    services: &'a WorkerServices,
    app: &'a Application<D, U>,
    report: &'a mut WorkerReport,
}

enum Fault {
    Client(StatusCode),
    Internal(String),
}

impl<S, D, U> Machine<'_, S, D, U>
where
    S: HttpSocket,
    D: Dispatcher,
    U: UpgradeTarget,
{
    async fn drive(&mut self) -> WorkerExit {
        let mut state = State::Reading;
        loop {
            tracing::trace!(worker_id = %self.id, state = state.name(), "Worker state");
            state = match state {
                State::Reading => self.read_batch().await,
                State::Dispatching(batch) => self.dispatch(batch).await,
                State::Deciding => self.decide(),
                State::KeepAliveWait => self.keep_alive_wait().await,
                State::Upgrading(request) => self.upgrade(request),
                State::Closing => {
                    self.socket.close().await;
                    tokio::task::yield_now().await;
                    State::Terminated(WorkerExit::Closed)
                }
                State::Terminated(exit) => return exit,
                State::ErrorCleanup(kind) => return WorkerExit::Failed(kind),
            };
        }
    }

    fn keep_alive_enabled(&self) -> bool {
        !self.keep_alive.is_zero()
    }

    async fn read_batch(&mut self) -> State {
        while !self.socket.can_read_request() {
            if self.keep_alive_enabled() && self.socket.idle_time() >= self.keep_alive {
                tracing::debug!(
                    connection_id = %self.socket.connection_id(),
                    "Idle timeout while waiting for a request"
                );
                break;
            }
            if !self.socket.state().is_connected() {
                break;
            }
            self.socket.wait_for_ready_read(READ_SLICE).await;
        }

        if !self.socket.can_read_request() {
            self.socket.abort();
            return State::Closing;
        }

        let batch = self.socket.read();
        if batch.is_empty() {
            return State::Closing;
        }
        tracing::trace!(
            connection_id = %self.socket.connection_id(),
            requests = batch.len(),
            "Read request batch"
        );
        State::Dispatching(batch)
    }

    async fn dispatch(&mut self, batch: Vec<HttpRequest>) -> State {
        let upgrade = batch
            .first()
            .filter(|first| first.wants_upgrade())
            .map(HttpRequest::upgrade_protocol);
        if let Some(protocol) = upgrade {
            if protocol == "websocket" {
                return match batch.into_iter().next() {
                    Some(first) => State::Upgrading(first),
                    None => State::Closing,
                };
            }
            tracing::debug!(
                connection_id = %self.socket.connection_id(),
                upgrade = %protocol,
                "Unsupported upgrade target"
            );
            metrics::record_upgrade("unsupported");
            return State::Closing;
        }

        let keep_alive = self.keep_alive_enabled();
        for request in batch {
            let mut responder = Responder::new(&mut self.socket, keep_alive);
            let outcome = AssertUnwindSafe(self.app.dispatcher.execute(request, &mut responder))
                .catch_unwind()
                .await;
            self.report.requests_dispatched += 1;

            if responder.write_failed() {
                metrics::record_request("write_failed");
                return State::ErrorCleanup(FailureKind::WriteFailed);
            }

            let fault = match outcome {
                Ok(Ok(())) if responder.responses_written() > 0 => None,
                Ok(Ok(())) => Some(Fault::Internal("dispatcher wrote no response".into())),
                Ok(Err(DispatchError::Client { status })) => Some(Fault::Client(status)),
                Ok(Err(e)) => Some(Fault::Internal(e.to_string())),
                Err(panic) => Some(Fault::Internal(panic_message(panic.as_ref()))),
            };

            let Some(fault) = fault else {
                metrics::record_request("ok");
                continue;
            };

            let status = match fault {
                Fault::Client(status) => {
                    tracing::debug!(
                        connection_id = %responder.connection_id(),
                        status = status.as_u16(),
                        "Client fault"
                    );
                    metrics::record_request("client_fault");
                    status
                }
                Fault::Internal(message) => {
                    tracing::error!(
                        connection_id = %responder.connection_id(),
                        error = %message,
                        "Unhandled fault during dispatch"
                    );
                    metrics::record_request("internal_fault");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };

            if responder.responses_written() == 0 && responder.write_status(status).await.is_err() {
                return State::ErrorCleanup(FailureKind::WriteFailed);
            }
            // A fault ends the batch; the rest of the pipelined requests are dropped.
            break;
        }
        State::Deciding
    }

    fn decide(&self) -> State {
        if !self.keep_alive_enabled() {
            return State::Closing;
        }
        let live = self.services.live_worker_count();
        if self.max_workers > 0 && live >= self.max_workers {
            tracing::debug!(
                connection_id = %self.socket.connection_id(),
                live_workers = live,
                max_workers = self.max_workers,
                "Worker limit reached, not keeping connection alive"
            );
            return State::Closing;
        }
        State::KeepAliveWait
    }

    async fn keep_alive_wait(&mut self) -> State {
        self.report.keep_alive_waits += 1;
        loop {
            if self.socket.wait_for_ready_read(KEEP_ALIVE_SLICE).await {
                return State::Reading;
            }

            let state = self.socket.state();
            if !state.is_connected() {
                if state.is_remote_closed() {
                    tracing::debug!(
                        connection_id = %self.socket.connection_id(),
                        "Connection closed by peer"
                    );
                } else {
                    tracing::warn!(
                        connection_id = %self.socket.connection_id(),
                        state = ?state,
                        "Connection lost while waiting for next request"
                    );
                }
                return State::Closing;
            }
            if self.socket.idle_time() >= self.keep_alive {
                tracing::debug!(
                    connection_id = %self.socket.connection_id(),
                    "Keep-alive timeout"
                );
                return State::Closing;
            }

            tokio::task::yield_now().await;
        }
    }

    fn upgrade(&self, request: HttpRequest) -> State {
        let result = handshake(
            self.app.upgrade.as_ref(),
            self.app.sessions.as_ref(),
            &self.app.session_cookie,
            &self.socket,
            request,
        );
        match result {
            Ok(Handoff::Transferred) => State::Terminated(WorkerExit::Upgraded),
            Ok(Handoff::NoEndpoint) => State::Closing,
            Err(e) => {
                tracing::error!(
                    connection_id = %self.socket.connection_id(),
                    error = %e,
                    "Upgrade handoff failed"
                );
                metrics::record_upgrade("failed");
                State::ErrorCleanup(FailureKind::UpgradeFailed)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic".to_string()
    }
}
