//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! raw request + matched Route
//!     → engine.rs (decode → invoke inside the failure boundary → retry)
//!     → panic.rs (catch panics, keep the panic-site backtrace)
//!     → classify.rs (outcome → Success / Retry / Terminal)
//!     → http/response.rs (encode the typed response)
//!
//! Event feeds:
//!     → stream.rs (handler task writes chunks, body drains them)
//! ```
//!
//! # Design Decisions
//! - Panics are caught at the handler boundary and never reach the server
//! - Only unclassified failures matching the transient predicate are retried
//! - Retries re-invoke immediately, with no backoff

pub mod classify;
pub mod engine;
pub mod failure;
pub mod panic;
pub mod stream;

pub use classify::{
    Classifier, SqlStateError, SqlStatePredicate, TransientPredicate, Verdict, LOCK_NOT_AVAILABLE,
    SERIALIZATION_FAILURE,
};
pub use engine::Engine;
pub use failure::{Failure, OrStatus};
pub use panic::{catch_panic, Caught, Panic};
