//! Connection identity and socket state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Describe whether a socket is still usable, and why not
//!
//! # Design Decisions
//! - A disconnect carries its reason so callers can pick a log severity
//!   without branching control flow on it

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a socket stopped being connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed its side of the connection.
    RemoteClosed,
    /// The socket was forcibly aborted locally.
    Aborted,
    /// The socket was closed locally after a graceful shutdown.
    LocalClosed,
    /// An I/O or framing error occurred.
    Error(io::ErrorKind),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::RemoteClosed => write!(f, "remote closed"),
            DisconnectReason::Aborted => write!(f, "aborted"),
            DisconnectReason::LocalClosed => write!(f, "closed"),
            DisconnectReason::Error(kind) => write!(f, "error: {}", kind),
        }
    }
}

/// Connection state of a socket handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Connected and usable for I/O.
    Connected,
    /// No longer usable.
    Disconnected(DisconnectReason),
}

impl SocketState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SocketState::Connected)
    }

    /// The expected "peer went away" case, logged at a lower severity.
    pub fn is_remote_closed(&self) -> bool {
        matches!(self, SocketState::Disconnected(DisconnectReason::RemoteClosed))
    }
}
