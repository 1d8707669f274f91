//! Typed JSON-over-HTTP handler server.
//!
//! Handlers are registered on exact paths and take one of a fixed set of
//! request variants (JSON body, query string, multipart form, event feed).
//! The dispatch engine decodes the request, runs the handler inside a panic
//! boundary, retries it when it fails with a transient storage conflict,
//! and encodes exactly one response.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServerConfig;
pub use dispatch::{Failure, OrStatus};
pub use http::{listen, Envelope, FileStream, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::Routes;
