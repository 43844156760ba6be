//! Shared utilities for worker and end-to-end tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

use action_worker::dispatch::{DispatchError, Dispatcher};
use action_worker::http::{HttpRequest, ResponseHeader};
use action_worker::lifecycle::{KeepAlivePolicy, WorkerServices};
use action_worker::net::connection::{ConnectionId, DisconnectReason, SocketState};
use action_worker::net::{HttpSocket, SocketDescriptor};
use action_worker::session::{MemorySessionStore, Session};
use action_worker::upgrade::{ProtocolHandler, UpgradeError, UpgradeTarget};
use action_worker::worker::{current_worker, Application, ConnectionWorker, Responder};

// ---------------------------------------------------------------------------
// Scripted socket
// ---------------------------------------------------------------------------

/// Something the peer does, `at` after the socket is bound.
#[derive(Debug, Clone)]
pub enum Event {
    Requests(Vec<HttpRequest>),
    RemoteClose,
    Error(io::ErrorKind),
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    events: Vec<(Duration, Event)>,
    fail_writes: bool,
    fail_duplicate: bool,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(mut self, at_ms: u64, paths: &[&str]) -> Self {
        let batch = paths.iter().map(|path| HttpRequest::get(path, &[])).collect();
        self.events.push((Duration::from_millis(at_ms), Event::Requests(batch)));
        self
    }

    pub fn request(mut self, at_ms: u64, request: HttpRequest) -> Self {
        self.events
            .push((Duration::from_millis(at_ms), Event::Requests(vec![request])));
        self
    }

    pub fn remote_close(mut self, at_ms: u64) -> Self {
        self.events.push((Duration::from_millis(at_ms), Event::RemoteClose));
        self
    }

    pub fn error(mut self, at_ms: u64, kind: io::ErrorKind) -> Self {
        self.events.push((Duration::from_millis(at_ms), Event::Error(kind)));
        self
    }

    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn fail_duplicate(mut self) -> Self {
        self.fail_duplicate = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Written {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Everything the worker did to a mock socket.
#[derive(Debug, Default)]
pub struct SocketLog {
    pub responses: Vec<Written>,
    pub aborts: usize,
    pub closes: usize,
    pub drops: usize,
    pub duplicates: usize,
    pub binds: usize,
    pub descriptors_released: usize,
}

pub type SharedLog = Arc<Mutex<SocketLog>>;

pub struct MockSocket {
    id: ConnectionId,
    events: VecDeque<(Instant, Event)>,
    pending: Vec<HttpRequest>,
    state: SocketState,
    last_activity: Instant,
    fail_writes: bool,
    fail_duplicate: bool,
    log: SharedLog,
}

impl MockSocket {
    fn new(script: Script, log: SharedLog) -> Self {
        let now = Instant::now();
        let mut events: Vec<_> = script
            .events
            .into_iter()
            .map(|(offset, event)| (now + offset, event))
            .collect();
        events.sort_by_key(|(at, _)| *at);
        Self {
            id: ConnectionId::new(),
            events: events.into(),
            pending: Vec::new(),
            state: SocketState::Connected,
            last_activity: now,
            fail_writes: script.fail_writes,
            fail_duplicate: script.fail_duplicate,
            log,
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Requests(batch) => {
                self.pending.extend(batch);
                self.last_activity = Instant::now();
            }
            Event::RemoteClose => {
                self.state = SocketState::Disconnected(DisconnectReason::RemoteClosed)
            }
            Event::Error(kind) => self.state = SocketState::Disconnected(DisconnectReason::Error(kind)),
        }
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.log.lock().unwrap().drops += 1;
    }
}

impl HttpSocket for MockSocket {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn can_read_request(&self) -> bool {
        !self.pending.is_empty()
    }

    async fn wait_for_ready_read(&mut self, wait: Duration) -> bool {
        if !self.pending.is_empty() {
            return true;
        }
        if !self.state.is_connected() {
            return false;
        }
        let deadline = Instant::now() + wait;
        match self.events.front() {
            Some((at, _)) if *at <= deadline => {
                let at = *at;
                tokio::time::sleep_until(at).await;
                if let Some((_, event)) = self.events.pop_front() {
                    self.apply(event);
                }
                !self.pending.is_empty()
            }
            _ => {
                tokio::time::sleep_until(deadline).await;
                false
            }
        }
    }

    fn read(&mut self) -> Vec<HttpRequest> {
        std::mem::take(&mut self.pending)
    }

    async fn write(&mut self, header: &ResponseHeader, body: &[u8]) -> io::Result<usize> {
        if self.fail_writes || !self.state.is_connected() {
            self.state = SocketState::Disconnected(DisconnectReason::Error(io::ErrorKind::BrokenPipe));
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.log.lock().unwrap().responses.push(Written {
            status: header.status(),
            headers: header.headers().clone(),
            body: body.to_vec(),
        });
        self.last_activity = Instant::now();
        Ok(header.to_bytes(body.len()).len() + body.len())
    }

    fn abort(&mut self) {
        self.log.lock().unwrap().aborts += 1;
        self.pending.clear();
        if self.state.is_connected() {
            self.state = SocketState::Disconnected(DisconnectReason::Aborted);
        }
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
        if self.state.is_connected() {
            self.state = SocketState::Disconnected(DisconnectReason::LocalClosed);
        }
    }

    fn duplicate(&self) -> io::Result<OwnedFd> {
        if self.fail_duplicate {
            return Err(io::Error::new(io::ErrorKind::Other, "dup refused"));
        }
        self.log.lock().unwrap().duplicates += 1;
        let (ours, _theirs) = UnixStream::pair()?;
        Ok(OwnedFd::from(ours))
    }
}

/// Descriptor that binds to a [`MockSocket`], or fails to.
pub struct MockDescriptor {
    script: Script,
    fail_bind: bool,
    log: SharedLog,
}

impl MockDescriptor {
    pub fn new(script: Script) -> (Self, SharedLog) {
        let log = SharedLog::default();
        let descriptor = Self {
            script,
            fail_bind: false,
            log: Arc::clone(&log),
        };
        (descriptor, log)
    }

    pub fn failing() -> (Self, SharedLog) {
        let (mut descriptor, log) = Self::new(Script::new());
        descriptor.fail_bind = true;
        (descriptor, log)
    }
}

impl Drop for MockDescriptor {
    fn drop(&mut self) {
        self.log.lock().unwrap().descriptors_released += 1;
    }
}

impl SocketDescriptor for MockDescriptor {
    type Socket = MockSocket;

    fn raw_fd(&self) -> RawFd {
        42
    }

    fn bind(self) -> io::Result<MockSocket> {
        if self.fail_bind {
            return Err(io::Error::new(io::ErrorKind::Other, "bind refused"));
        }
        self.log.lock().unwrap().binds += 1;
        Ok(MockSocket::new(self.script.clone(), Arc::clone(&self.log)))
    }
}

// ---------------------------------------------------------------------------
// Recording dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Behavior {
    /// 200 with an `x-handler` header and the path as body.
    Respond,
    /// Sleep, then respond.
    Slow(Duration),
    ClientFault(StatusCode),
    InternalFault,
    Panic,
    /// Return `Ok` without writing.
    Silent,
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    behaviors: HashMap<String, Behavior>,
    seen: Mutex<Vec<String>>,
    in_context: Mutex<Vec<bool>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, path: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(path.to_string(), behavior);
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Whether each dispatch observed a current worker context.
    pub fn in_context(&self) -> Vec<bool> {
        self.in_context.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    async fn execute<S: HttpSocket>(
        &self,
        request: HttpRequest,
        responder: &mut Responder<'_, S>,
    ) -> Result<(), DispatchError> {
        let path = request.path().to_string();
        self.seen.lock().unwrap().push(path.clone());
        self.in_context.lock().unwrap().push(current_worker().is_some());

        let behavior = self.behaviors.get(&path).cloned().unwrap_or(Behavior::Respond);
        match behavior {
            Behavior::Respond => respond(responder, &path).await,
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                respond(responder, &path).await
            }
            Behavior::ClientFault(status) => Err(DispatchError::client(status)),
            Behavior::InternalFault => Err(DispatchError::internal("handler failed")),
            Behavior::Panic => panic!("handler exploded"),
            Behavior::Silent => Ok(()),
        }
    }
}

async fn respond<S: HttpSocket>(responder: &mut Responder<'_, S>, path: &str) -> Result<(), DispatchError> {
    let mut header = ResponseHeader::new(StatusCode::OK);
    header.set_raw_header(
        axum::http::HeaderName::from_static("x-handler"),
        axum::http::HeaderValue::from_static("recording"),
    );
    responder.write(header, path.as_bytes()).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Recording upgrade target
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct UpgradeLog {
    pub searches: usize,
    pub created: usize,
    pub sessions: Vec<Session>,
    /// Descriptors held by started handlers.
    pub held: Vec<OwnedFd>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingUpgrade {
    accept: bool,
    fail_start: bool,
    log: Arc<Mutex<UpgradeLog>>,
}

impl RecordingUpgrade {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self::default()
    }

    pub fn failing_start() -> Self {
        Self {
            accept: true,
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Arc<Mutex<UpgradeLog>> {
        Arc::clone(&self.log)
    }
}

pub struct RecordingHandler {
    fd: OwnedFd,
    fail_start: bool,
    log: Arc<Mutex<UpgradeLog>>,
}

impl ProtocolHandler for RecordingHandler {
    fn start_opening(self, session: Session) -> Result<(), UpgradeError> {
        if self.fail_start {
            return Err(UpgradeError::Start("handler refused".into()));
        }
        let mut log = self.log.lock().unwrap();
        log.sessions.push(session);
        log.held.push(self.fd);
        Ok(())
    }
}

impl UpgradeTarget for RecordingUpgrade {
    type Handler = RecordingHandler;

    fn search_endpoint(&self, _request: &HttpRequest) -> bool {
        self.log.lock().unwrap().searches += 1;
        self.accept
    }

    fn create(
        &self,
        fd: OwnedFd,
        _peer: Option<SocketAddr>,
        _request: HttpRequest,
    ) -> Result<RecordingHandler, UpgradeError> {
        self.log.lock().unwrap().created += 1;
        Ok(RecordingHandler {
            fd,
            fail_start: self.fail_start,
            log: Arc::clone(&self.log),
        })
    }
}

// ---------------------------------------------------------------------------
// Worker construction
// ---------------------------------------------------------------------------

pub fn services(keep_alive_secs: u64) -> Arc<WorkerServices> {
    Arc::new(WorkerServices::with_policy(KeepAlivePolicy::fixed(keep_alive_secs)))
}

pub fn app(
    dispatcher: &Arc<RecordingDispatcher>,
    upgrade: RecordingUpgrade,
    sessions: MemorySessionStore,
) -> Application<RecordingDispatcher, RecordingUpgrade> {
    Application::new(Arc::clone(dispatcher), Arc::new(upgrade), Arc::new(sessions))
}

pub fn worker(
    descriptor: MockDescriptor,
    max_workers: usize,
    services: &Arc<WorkerServices>,
    dispatcher: &Arc<RecordingDispatcher>,
) -> ConnectionWorker<MockDescriptor, RecordingDispatcher, RecordingUpgrade> {
    ConnectionWorker::new(
        descriptor,
        max_workers,
        Arc::clone(services),
        app(dispatcher, RecordingUpgrade::rejecting(), MemorySessionStore::new()),
    )
}

pub fn websocket_request(path: &str, extra: &[(&str, &str)]) -> HttpRequest {
    let mut headers = vec![
        ("Connection", "Upgrade"),
        ("Upgrade", "websocket"),
        ("Sec-WebSocket-Version", "13"),
        ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
    ];
    headers.extend_from_slice(extra);
    HttpRequest::get(path, &headers)
}

// ---------------------------------------------------------------------------
// Raw HTTP client helpers
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Try to take one complete response off the front of `buf`.
fn take_response(buf: &mut Vec<u8>) -> Option<RawResponse> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    let head_len = match response.parse(buf).expect("malformed response") {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return None,
    };

    let headers: Vec<(String, String)> = response
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.parse::<usize>().expect("bad content-length"))
        .unwrap_or(0);
    if buf.len() < head_len + content_length {
        return None;
    }

    let status = response.code.expect("status code");
    let body = buf[head_len..head_len + content_length].to_vec();
    buf.drain(..head_len + content_length);
    Some(RawResponse { status, headers, body })
}

/// Read one response from `stream`, keeping leftover bytes in `buf`.
pub async fn read_response(stream: &mut TcpStream, buf: &mut Vec<u8>) -> RawResponse {
    loop {
        if let Some(response) = take_response(buf) {
            return response;
        }
        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("timed out waiting for response")
            .expect("read failed");
        assert!(n > 0, "connection closed before a full response");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Wait until the server closes `stream`.
pub async fn expect_eof(stream: &mut TcpStream) {
    let mut chunk = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
        .await
        .expect("server kept the connection open")
        .unwrap_or(0);
    assert_eq!(n, 0, "unexpected data after last response");
}
