//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, raw descriptor)
//!     → socket.rs   (SocketDescriptor::bind inside the worker)
//!     → tcp.rs      (buffered reads, pipelined framing, writes)
//!     → connection.rs (ids, connection state and disconnect reason)
//!
//! Socket States:
//!     Connected → Disconnected(RemoteClosed | Aborted | LocalClosed | Error)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - The acceptor hands over an `OwnedFd`; binding happens on the worker
//!   so an acquisition failure is that worker's to report

pub mod connection;
pub mod listener;
pub mod socket;
pub mod tcp;

pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use socket::{HttpSocket, SocketDescriptor, TcpDescriptor};
pub use tcp::TcpHttpSocket;
