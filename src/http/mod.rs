//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, fallback dispatch)
//!     → request.rs (read body once, build the typed request)
//!         → form.rs (multipart parsing with disk spill)
//!     → [dispatch engine runs the handler]
//!     → response.rs (envelope or file download)
//!         → content.rs + date.rs (ranges, conditional GET)
//!     → Send to client
//! ```

pub mod content;
pub mod date;
pub mod form;
pub mod request;
pub mod response;
pub mod server;

pub use form::{FormFile, MultipartForm};
pub use request::{
    FormRequest, InboundRequest, JsonRequest, QueryRequest, RequestContext, RequestKind, StreamClosed,
    StreamRequest, TypedRequest,
};
pub use response::{Envelope, FailCode, FileStream, TypedResponse, BUSY_BODY};
pub use server::{listen, HttpServer, ServerError};
