//! WebSocket upgrade target.
//!
//! # Responsibilities
//! - Keep a registry of WebSocket endpoints keyed by request path
//! - Validate the opening handshake and derive the accept key
//! - Run each upgraded connection on the service's long-lived runtime
//!
//! # Design Decisions
//! - Frame protocol is left to tokio-tungstenite; ping/pong and the close
//!   handshake are handled there
//! - A session ends when the peer disconnects; dropping the stream closes
//!   the duplicated descriptor

use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::http::HttpRequest;
use crate::session::Session;
use crate::upgrade::{ProtocolHandler, UpgradeError, UpgradeTarget};

/// Application callbacks for one WebSocket path.
pub trait WebSocketEndpoint: Send + Sync + 'static {
    fn on_open(&self, _session: &Session) {}

    /// Handle a text or binary message; the returned message is sent back.
    fn on_message(&self, session: &Session, message: Message) -> Option<Message>;

    fn on_close(&self, _session: &Session) {}
}

/// Sends every data message straight back.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoEndpoint;

impl WebSocketEndpoint for EchoEndpoint {
    fn on_message(&self, _session: &Session, message: Message) -> Option<Message> {
        Some(message)
    }
}

/// Upgrade target serving registered WebSocket endpoints.
pub struct WebSocketService {
    endpoints: DashMap<String, Arc<dyn WebSocketEndpoint>>,
    runtime: Handle,
}

impl WebSocketService {
    /// Upgraded sessions will run on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            endpoints: DashMap::new(),
            runtime,
        }
    }

    pub fn register(&self, path: impl Into<String>, endpoint: impl WebSocketEndpoint) {
        self.endpoints.insert(path.into(), Arc::new(endpoint));
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}

impl UpgradeTarget for WebSocketService {
    type Handler = WebSocketOpening;

    fn search_endpoint(&self, request: &HttpRequest) -> bool {
        self.endpoints.contains_key(request.path())
    }

    fn create(
        &self,
        fd: OwnedFd,
        peer: Option<SocketAddr>,
        request: HttpRequest,
    ) -> Result<WebSocketOpening, UpgradeError> {
        let endpoint = self
            .endpoints
            .get(request.path())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| UpgradeError::Handshake(format!("no endpoint for {}", request.path())))?;

        if request.header("sec-websocket-version").as_deref().map(str::trim) != Some("13") {
            return Err(UpgradeError::Handshake("unsupported Sec-WebSocket-Version".into()));
        }
        let key = request
            .header("sec-websocket-key")
            .ok_or_else(|| UpgradeError::Handshake("missing Sec-WebSocket-Key".into()))?;

        Ok(WebSocketOpening {
            fd,
            peer,
            accept_key: derive_accept_key(key.trim().as_bytes()),
            endpoint,
            runtime: self.runtime.clone(),
        })
    }
}

/// A matched WebSocket connection waiting to start.
pub struct WebSocketOpening {
    fd: OwnedFd,
    peer: Option<SocketAddr>,
    accept_key: String,
    endpoint: Arc<dyn WebSocketEndpoint>,
    runtime: Handle,
}

impl ProtocolHandler for WebSocketOpening {
    fn start_opening(self, session: Session) -> Result<(), UpgradeError> {
        let WebSocketOpening {
            fd,
            peer,
            accept_key,
            endpoint,
            runtime,
        } = self;

        let std_stream = std::net::TcpStream::from(fd);
        std_stream
            .set_nonblocking(true)
            .map_err(|e| UpgradeError::Start(e.to_string()))?;

        runtime.spawn(async move {
            match TcpStream::from_std(std_stream) {
                Ok(stream) => serve(stream, accept_key, endpoint, session, peer).await,
                Err(e) => tracing::warn!(error = %e, "Failed to register upgraded socket"),
            }
        });
        Ok(())
    }
}

async fn serve(
    mut stream: TcpStream,
    accept_key: String,
    endpoint: Arc<dyn WebSocketEndpoint>,
    session: Session,
    peer: Option<SocketAddr>,
) {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(peer = ?peer, error = %e, "WebSocket handshake write failed");
        return;
    }

    let mut ws = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
    tracing::debug!(peer = ?peer, session_id = ?session.id(), "WebSocket opened");
    endpoint.on_open(&session);

    while let Some(frame) = ws.next().await {
        match frame {
            Ok(message) if message.is_text() || message.is_binary() => {
                if let Some(reply) = endpoint.on_message(&session, message) {
                    if let Err(e) = ws.send(reply).await {
                        tracing::debug!(peer = ?peer, error = %e, "WebSocket send failed");
                        break;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = ?peer, error = %e, "WebSocket read ended");
                break;
            }
        }
    }

    endpoint.on_close(&session);
    tracing::debug!(peer = ?peer, "WebSocket disconnected");
}
