//! Per-connection HTTP worker library.
//!
//! Each accepted connection is owned by one `ConnectionWorker` that reads
//! pipelined requests, dispatches them, decides keep-alive, hands the
//! connection to a WebSocket service on upgrade, and always cleans up.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod session;
pub mod upgrade;
pub mod worker;

pub use config::ServerConfig;
pub use dispatch::{DispatchError, Dispatcher, RouterDispatcher};
pub use http::{HttpRequest, HttpServer, ResponseHeader};
pub use lifecycle::{KeepAlivePolicy, Shutdown, WorkerRegistry, WorkerServices};
pub use net::{HttpSocket, Listener, SocketDescriptor, TcpDescriptor, TcpHttpSocket};
pub use session::{MemorySessionStore, Session, SessionStore};
pub use upgrade::{NoUpgrade, UpgradeTarget, WebSocketService};
pub use worker::{current_worker, Application, ConnectionWorker, WorkerExit, WorkerReport};
