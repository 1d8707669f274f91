//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before serving):
//!     Routes::handle / handle_stream / handle_raw
//!     → type-erase the handler
//!     → insert under its exact path
//!
//! Serving:
//!     request path → Routes::get → Route or 404
//! ```
//!
//! # Design Decisions
//! - Exact path match only
//! - Table is frozen behind an Arc once the server is built

pub mod router;

pub use router::{RawHandler, Route, RouteError, Routes, StreamHandler, TypedHandler, TypedRoute};
