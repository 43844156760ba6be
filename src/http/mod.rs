//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (owned by a worker)
//!     → parser.rs (httparse framing, pipelined batches)
//!     → request.rs (request unit handed to the dispatcher)
//!     → response.rs (status line + headers written by the responder)
//!
//! server.rs: accept loop starting one worker per connection
//! ```

pub mod parser;
pub mod request;
pub mod response;
pub mod server;

use axum::http::HeaderName;

pub use request::HttpRequest;
pub use response::ResponseHeader;
pub use server::HttpServer;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
