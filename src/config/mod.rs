//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → SettingsSource for the keep-alive policy (read once per process)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload because the
//!   keep-alive timeout is resolved once per process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{HttpConfig, KeepAliveSetting, ListenerConfig, ObservabilityConfig, ServerConfig};
