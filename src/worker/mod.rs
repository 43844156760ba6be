//! Connection worker subsystem.
//!
//! # Data Flow
//! ```text
//! acceptor hands over (descriptor, max_workers)
//!     → machine.rs: registry guard, bind socket, task-local context
//!     → read batch → dispatch each request in order (responder.rs)
//!     → keep-alive decision / upgrade handoff / close
//!     → single cleanup, WorkerReport returned
//! ```
//!
//! # Design Decisions
//! - One worker per connection, running as its own tokio task
//! - States are an enum; each step returns the next state and cleanup is the
//!   one place every path converges
//! - Faults inside a dispatcher never escape the worker

pub mod context;
pub mod machine;
pub mod responder;
pub mod state;

pub use context::{current_worker, WorkerContext, WorkerId};
pub use machine::{Application, ConnectionWorker, DEFAULT_SESSION_COOKIE};
pub use responder::Responder;
pub use state::{FailureKind, WorkerExit, WorkerReport};
