//! Tokio TCP implementation of [`HttpSocket`].
//!
//! # Responsibilities
//! - Own one accepted TCP stream and its inbound buffer
//! - Track idle time and connection state
//! - Frame pipelined requests out of the buffer
//!
//! # Design Decisions
//! - Readiness is polled with a bounded `read_buf` so a wait never blocks
//!   longer than the caller's slice
//! - A framing error poisons the socket (`Error(InvalidData)`); requests
//!   framed before the error are still returned

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsFd, OwnedFd};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::http::parser::{parse_batch, parse_request, Framing, DEFAULT_MAX_BODY};
use crate::http::{HttpRequest, ResponseHeader};
use crate::net::connection::{ConnectionId, DisconnectReason, SocketState};
use crate::net::socket::HttpSocket;

const READ_CHUNK: usize = 8 * 1024;

/// An HTTP/1.x connection over a tokio `TcpStream`.
#[derive(Debug)]
pub struct TcpHttpSocket {
    id: ConnectionId,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    buffer: Vec<u8>,
    max_body: usize,
    request_ready: bool,
    state: SocketState,
    last_activity: Instant,
}

impl TcpHttpSocket {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            id: ConnectionId::new(),
            stream: Some(stream),
            peer,
            buffer: Vec::with_capacity(READ_CHUNK),
            max_body: DEFAULT_MAX_BODY,
            request_ready: false,
            state: SocketState::Connected,
            last_activity: Instant::now(),
        }
    }

    /// Requests declaring a larger body poison the socket.
    pub fn with_max_body(mut self, limit: usize) -> Self {
        self.max_body = limit;
        self
    }

    /// Bind to an accepted descriptor. Must run inside a tokio runtime.
    ///
    /// On failure the descriptor is closed before returning.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        let std_stream = std::net::TcpStream::from(fd);
        std_stream.set_nonblocking(true)?;
        let stream = TcpStream::from_std(std_stream)?;
        Ok(Self::new(stream))
    }

    /// Re-evaluate whether the buffer holds a complete request.
    fn scan(&mut self) {
        match parse_request(&self.buffer, self.max_body) {
            Ok(Framing::Complete(..)) => self.request_ready = true,
            Ok(Framing::Partial) => self.request_ready = false,
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Unparseable request");
                self.request_ready = false;
                self.state = SocketState::Disconnected(DisconnectReason::Error(io::ErrorKind::InvalidData));
            }
        }
    }

    fn not_connected() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "socket is closed")
    }
}

impl HttpSocket for TcpHttpSocket {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn can_read_request(&self) -> bool {
        self.request_ready
    }

    async fn wait_for_ready_read(&mut self, wait: Duration) -> bool {
        if self.request_ready {
            return true;
        }
        if !self.state.is_connected() {
            return false;
        }
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        self.buffer.reserve(READ_CHUNK);
        match tokio::time::timeout(wait, stream.read_buf(&mut self.buffer)).await {
            Err(_) => false,
            Ok(Ok(0)) => {
                self.state = SocketState::Disconnected(DisconnectReason::RemoteClosed);
                false
            }
            Ok(Ok(_)) => {
                self.last_activity = Instant::now();
                self.scan();
                true
            }
            Ok(Err(e)) => {
                self.state = SocketState::Disconnected(DisconnectReason::Error(e.kind()));
                false
            }
        }
    }

    fn read(&mut self) -> Vec<HttpRequest> {
        let batch = parse_batch(&self.buffer, self.max_body);
        self.buffer.drain(..batch.consumed);
        self.request_ready = false;

        if let Some(e) = batch.error {
            tracing::warn!(connection_id = %self.id, error = %e, "Discarding malformed request data");
            self.buffer.clear();
            self.state = SocketState::Disconnected(DisconnectReason::Error(io::ErrorKind::InvalidData));
        }
        batch.requests
    }

    async fn write(&mut self, header: &ResponseHeader, body: &[u8]) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(Self::not_connected)?;
        let head = header.to_bytes(body.len());

        let result = async {
            stream.write_all(&head).await?;
            stream.write_all(body).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                self.last_activity = Instant::now();
                Ok(head.len() + body.len())
            }
            Err(e) => {
                self.state = SocketState::Disconnected(DisconnectReason::Error(e.kind()));
                Err(e)
            }
        }
    }

    fn abort(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.request_ready = false;
        if self.state.is_connected() {
            self.state = SocketState::Disconnected(DisconnectReason::Aborted);
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::trace!(connection_id = %self.id, error = %e, "Shutdown after peer left");
            }
        }
        if self.state.is_connected() {
            self.state = SocketState::Disconnected(DisconnectReason::LocalClosed);
        }
    }

    fn duplicate(&self) -> io::Result<OwnedFd> {
        self.stream
            .as_ref()
            .ok_or_else(Self::not_connected)?
            .as_fd()
            .try_clone_to_owned()
    }
}
