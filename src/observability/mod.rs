//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Workers, registry, upgrade handoff produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection ID is attached to every per-connection event
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
