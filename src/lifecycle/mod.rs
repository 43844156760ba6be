//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → install WorkerServices (keep-alive policy + registry)
//!
//! Per worker (registry.rs):
//!     run() → enter() → ... → guard dropped on every exit path
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → stop accepting → wait_for_drain(timeout) → exit
//! ```
//!
//! # Design Decisions
//! - Keep-alive timeout and worker count are the only cross-worker state
//! - Memoized read-mostly value plus an atomic counter; no lock on the hot path
//! - Shutdown waits for workers, it never cancels them

pub mod keep_alive;
pub mod registry;
pub mod services;
pub mod shutdown;

pub use keep_alive::{KeepAlivePolicy, SettingsSource};
pub use registry::{WorkerGuard, WorkerRegistry};
pub use services::WorkerServices;
pub use shutdown::Shutdown;
