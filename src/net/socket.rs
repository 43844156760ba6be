//! Socket seams used by the connection worker.
//!
//! # Responsibilities
//! - `SocketDescriptor`: a raw, not-yet-bound connection handed over by the acceptor
//! - `HttpSocket`: the bound request reader / response writer a worker drives
//!
//! # Design Decisions
//! - Binding consumes the descriptor; on failure the descriptor is dropped
//!   (closed) inside `bind`, so it can never leak or be double-closed
//! - Duplication yields an independent `OwnedFd` so an upgraded protocol
//!   handler never shares a handle lifecycle with the worker

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::http::{HttpRequest, ResponseHeader};
use crate::net::connection::{ConnectionId, SocketState};
use crate::net::tcp::TcpHttpSocket;

/// An accepted connection that has not been bound to a socket handle yet.
pub trait SocketDescriptor: Send + 'static {
    type Socket: HttpSocket;

    /// Raw descriptor number, for logging.
    fn raw_fd(&self) -> RawFd;

    /// Bind a socket handle to this descriptor.
    fn bind(self) -> io::Result<Self::Socket>;
}

impl SocketDescriptor for OwnedFd {
    type Socket = TcpHttpSocket;

    fn raw_fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn bind(self) -> io::Result<TcpHttpSocket> {
        TcpHttpSocket::from_fd(self)
    }
}

/// An accepted TCP descriptor carrying the request body limit to apply once bound.
#[derive(Debug)]
pub struct TcpDescriptor {
    fd: OwnedFd,
    max_body: usize,
}

impl TcpDescriptor {
    pub fn new(fd: OwnedFd, max_body: usize) -> Self {
        Self { fd, max_body }
    }
}

impl SocketDescriptor for TcpDescriptor {
    type Socket = TcpHttpSocket;

    fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn bind(self) -> io::Result<TcpHttpSocket> {
        Ok(TcpHttpSocket::from_fd(self.fd)?.with_max_body(self.max_body))
    }
}

/// A bound, exclusively-owned HTTP connection.
pub trait HttpSocket: Send + 'static {
    fn connection_id(&self) -> ConnectionId;

    fn peer_addr(&self) -> Option<SocketAddr>;

    fn state(&self) -> SocketState;

    /// Elapsed time since the last I/O activity.
    fn idle_time(&self) -> Duration;

    /// Whether at least one complete request is buffered.
    fn can_read_request(&self) -> bool;

    /// Wait up to `wait` for new inbound data.
    ///
    /// Returns `true` if data arrived (or a complete request is already buffered).
    fn wait_for_ready_read(&mut self, wait: Duration) -> impl Future<Output = bool> + Send;

    /// Take every complete buffered request, in arrival order.
    fn read(&mut self) -> Vec<HttpRequest>;

    /// Write one response. Returns the number of bytes written.
    fn write(&mut self, header: &ResponseHeader, body: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Drop the connection immediately, discarding buffered data.
    fn abort(&mut self);

    /// Signal "no more I/O", letting pending writes flush.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Duplicate the underlying OS descriptor.
    fn duplicate(&self) -> io::Result<OwnedFd>;
}
