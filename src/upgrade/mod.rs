//! Protocol upgrade subsystem.
//!
//! # Data Flow
//! ```text
//! first request of a batch: Connection: upgrade, Upgrade: websocket
//!     → handoff.rs: search_endpoint(request)?
//!         no  → worker closes normally
//!         yes → duplicate fd → create handler (fd, peer, request)
//!             → resolve session from cookie → start_opening(session)
//!             → worker drops its own handle, never touches the fd again
//!     → websocket.rs (tokio-tungstenite) runs on the long-lived runtime
//! ```
//!
//! # Design Decisions
//! - The upgraded handler owns a duplicated descriptor, so its lifetime is
//!   independent of the finishing worker
//! - Handlers tear themselves down on disconnect

pub mod handoff;
pub mod websocket;

use std::net::SocketAddr;
use std::os::fd::OwnedFd;

use thiserror::Error;

use crate::http::HttpRequest;
use crate::session::Session;

pub use handoff::{handshake, Handoff};
pub use websocket::{EchoEndpoint, WebSocketEndpoint, WebSocketService};

/// Failure after an upgrade endpoint matched.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("failed to duplicate socket: {0}")]
    Duplicate(#[source] std::io::Error),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("protocol handler failed to start: {0}")]
    Start(String),
}

/// A long-lived protocol handler bound to a duplicated descriptor.
pub trait ProtocolHandler: Send + 'static {
    /// Begin the protocol's opening sequence with the resolved session.
    fn start_opening(self, session: Session) -> Result<(), UpgradeError>;
}

/// A service that can take over an upgraded connection.
pub trait UpgradeTarget: Send + Sync + 'static {
    type Handler: ProtocolHandler;

    /// Whether an endpoint accepts this upgrade request.
    fn search_endpoint(&self, request: &HttpRequest) -> bool;

    /// Construct a handler owning `fd`.
    fn create(
        &self,
        fd: OwnedFd,
        peer: Option<SocketAddr>,
        request: HttpRequest,
    ) -> Result<Self::Handler, UpgradeError>;
}

/// Upgrade target that accepts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpgrade;

/// Handler type of [`NoUpgrade`]; cannot be constructed.
#[derive(Debug)]
pub enum NoHandler {}

impl ProtocolHandler for NoHandler {
    fn start_opening(self, _session: Session) -> Result<(), UpgradeError> {
        match self {}
    }
}

impl UpgradeTarget for NoUpgrade {
    type Handler = NoHandler;

    fn search_endpoint(&self, _request: &HttpRequest) -> bool {
        false
    }

    fn create(
        &self,
        _fd: OwnedFd,
        _peer: Option<SocketAddr>,
        _request: HttpRequest,
    ) -> Result<NoHandler, UpgradeError> {
        Err(UpgradeError::Handshake("no upgrade endpoints registered".into()))
    }
}
