//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Standalone (http::listen):
//!     Validate config → Bind → Attach signals → Serve
//!     SIGHUP/SIGINT/SIGTERM/SIGQUIT → log → exit(5)
//!
//! Embedded (HttpServer::run):
//!     Shutdown::trigger → stop accepting → drain in-flight requests
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
