//! Response write contract.
//!
//! The only way dispatch produces output. A responder is created per
//! request; the worker inspects how many responses were written and whether
//! a write failed, never the bytes themselves.

use std::io;
use std::net::SocketAddr;

use axum::http::{header, HeaderValue, StatusCode};

use crate::http::ResponseHeader;
use crate::net::connection::ConnectionId;
use crate::net::socket::HttpSocket;

pub struct Responder<'a, S> {
    socket: &'a mut S,
    keep_alive: bool,
    written: usize,
    write_failed: bool,
}

impl<'a, S: HttpSocket> Responder<'a, S> {
    pub fn new(socket: &'a mut S, keep_alive: bool) -> Self {
        Self {
            socket,
            keep_alive,
            written: 0,
            write_failed: false,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.socket.connection_id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Whether responses advertise a persistent connection.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Write one response. Returns the number of bytes written.
    pub async fn write(&mut self, mut header: ResponseHeader, body: &[u8]) -> io::Result<usize> {
        if self.keep_alive {
            header.set_raw_header(header::CONNECTION, HeaderValue::from_static("Keep-Alive"));
        }
        match self.socket.write(&header, body).await {
            Ok(len) => {
                self.written += 1;
                tracing::trace!(
                    connection_id = %self.socket.connection_id(),
                    status = header.status().as_u16(),
                    bytes = len,
                    "Response written"
                );
                Ok(len)
            }
            Err(e) => {
                self.write_failed = true;
                Err(e)
            }
        }
    }

    /// Write a bodiless response carrying only `status`.
    pub async fn write_status(&mut self, status: StatusCode) -> io::Result<usize> {
        self.write(ResponseHeader::new(status), &[]).await
    }

    pub fn responses_written(&self) -> usize {
        self.written
    }

    pub fn write_failed(&self) -> bool {
        self.write_failed
    }
}
