//! action-worker: HTTP/1.x server with one worker per connection.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TCP──▶ net::Listener ──OwnedFd──▶ worker::ConnectionWorker (one task)
//!                                                   │
//!                        ┌──────────────────────────┼───────────────────────────┐
//!                        ▼                          ▼                           ▼
//!               dispatch::RouterDispatcher   keep-alive wait / close   upgrade::WebSocketService
//!                 (axum Router, demo)                                  (echo endpoint at /ws)
//!
//!     lifecycle::WorkerServices: keep-alive policy + live worker registry (process-wide)
//!     Ctrl+C → stop accepting → wait for workers to drain
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;

use action_worker::config::{load_config, ServerConfig};
use action_worker::lifecycle::shutdown::shutdown_signal;
use action_worker::net::Listener;
use action_worker::observability::{logging, metrics};
use action_worker::upgrade::EchoEndpoint;
use action_worker::{
    current_worker, Application, HttpServer, MemorySessionStore, RouterDispatcher, Shutdown,
    WebSocketService, WorkerServices,
};

#[derive(Parser)]
#[command(name = "action-worker")]
#[command(about = "HTTP server with per-connection workers", long_about = None)]
struct Cli {
    /// Path to a TOML config file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("action-worker v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        max_workers = config.worker.max_workers,
        keep_alive_timeout = %config.http.keep_alive_timeout,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = WorkerServices::install(Arc::new(config.clone()));
    tracing::info!(
        keep_alive_secs = services.keep_alive().resolve(),
        "Keep-alive policy resolved"
    );

    let dispatcher = RouterDispatcher::new(demo_router()).with_body_limit(config.http.body_limit);
    let websockets = WebSocketService::new(tokio::runtime::Handle::current());
    websockets.register("/ws", EchoEndpoint);
    let app = Application::new(
        Arc::new(dispatcher),
        Arc::new(websockets),
        Arc::new(MemorySessionStore::new()),
    );

    let listener = Listener::bind(&config.listener).await?;
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, Arc::clone(&services), app);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    shutdown_signal().await;
    shutdown.trigger();
    let drained = server_task.await?;

    tracing::info!(drained, "Shutdown complete");
    Ok(())
}

fn demo_router() -> Router {
    Router::new()
        .route("/", get(|| async { "action-worker\n" }))
        .route("/health", get(|| async { "ok\n" }))
        .route("/echo", post(|body: Bytes| async move { body }))
        .route("/whoami", get(whoami))
}

async fn whoami(ConnectInfo(peer): ConnectInfo<SocketAddr>) -> String {
    match current_worker() {
        Some(ctx) => format!("{} {} peer={}\n", ctx.worker_id, ctx.connection_id, peer),
        None => format!("peer={}\n", peer),
    }
}
