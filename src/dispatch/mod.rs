//! Application dispatch seam.
//!
//! # Data Flow
//! ```text
//! worker (one request at a time, batch order)
//!     → Dispatcher::execute(request, responder)
//!     → application writes exactly one response via the responder
//!     → Ok / ClientFault(status) / other fault back to the worker
//! ```
//!
//! # Design Decisions
//! - Faults are values, not unwinding; the worker decides the response
//! - A panic inside a dispatcher is caught by the worker and treated as an
//!   internal fault

pub mod router;

use std::future::Future;
use std::io;

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::HttpRequest;
use crate::net::socket::HttpSocket;
use crate::worker::Responder;

pub use router::RouterDispatcher;

/// Fault raised while dispatching one request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request was recognised as invalid; answer with `status`.
    #[error("client error: {status}")]
    Client { status: StatusCode },

    /// Writing the response failed.
    #[error("response write failed: {0}")]
    Io(#[from] io::Error),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn client(status: StatusCode) -> Self {
        DispatchError::Client { status }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        DispatchError::Internal(err.to_string())
    }

    pub fn is_client_fault(&self) -> bool {
        matches!(self, DispatchError::Client { .. })
    }
}

/// Application layer invoked once per request.
pub trait Dispatcher: Send + Sync + 'static {
    /// Handle `request`, writing its response through `responder`.
    fn execute<S: HttpSocket>(
        &self,
        request: HttpRequest,
        responder: &mut Responder<'_, S>,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}
