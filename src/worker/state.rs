//! Worker states and the outcome report.

use std::fmt;

use crate::http::HttpRequest;
use crate::worker::context::WorkerId;

/// States of the connection state machine after the socket is acquired.
///
/// Acquisition itself happens before the machine starts; a failure there
/// goes straight to cleanup.
#[derive(Debug)]
pub(crate) enum State {
    Reading,
    Dispatching(Vec<HttpRequest>),
    Deciding,
    KeepAliveWait,
    Upgrading(HttpRequest),
    Closing,
    Terminated(WorkerExit),
    ErrorCleanup(FailureKind),
}

impl State {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            State::Reading => "reading",
            State::Dispatching(_) => "dispatching",
            State::Deciding => "deciding",
            State::KeepAliveWait => "keep_alive_wait",
            State::Upgrading(_) => "upgrading",
            State::Closing => "closing",
            State::Terminated(_) => "terminated",
            State::ErrorCleanup(_) => "error_cleanup",
        }
    }
}

/// Terminal failure paths that route through error cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The socket handle could not bind to the descriptor.
    AcquireFailed,
    /// The upgrade handoff failed after an endpoint matched.
    UpgradeFailed,
    /// Writing a response failed.
    WriteFailed,
}

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The connection was closed by the worker.
    Closed,
    /// The connection was handed to a protocol handler.
    Upgraded,
    Failed(FailureKind),
}

impl WorkerExit {
    /// Metric label for this exit path.
    pub fn label(&self) -> &'static str {
        match self {
            WorkerExit::Closed => "closed",
            WorkerExit::Upgraded => "upgraded",
            WorkerExit::Failed(FailureKind::AcquireFailed) => "acquire_failed",
            WorkerExit::Failed(FailureKind::UpgradeFailed) => "upgrade_failed",
            WorkerExit::Failed(FailureKind::WriteFailed) => "write_failed",
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a finished worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub exit: WorkerExit,
    /// Requests handed to the dispatcher, faulted ones included.
    pub requests_dispatched: usize,
    /// Times the worker entered the keep-alive wait.
    pub keep_alive_waits: usize,
}

impl WorkerReport {
    pub(crate) fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            exit: WorkerExit::Closed,
            requests_dispatched: 0,
            keep_alive_waits: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_labels() {
        assert_eq!(WorkerExit::Closed.label(), "closed");
        assert_eq!(
            WorkerExit::Failed(FailureKind::WriteFailed).to_string(),
            "write_failed"
        );
    }

    #[test]
    fn new_report_is_empty() {
        let report = WorkerReport::new(WorkerId::new());
        assert_eq!(report.exit, WorkerExit::Closed);
        assert_eq!(report.requests_dispatched, 0);
        assert_eq!(report.keep_alive_waits, 0);
    }
}
