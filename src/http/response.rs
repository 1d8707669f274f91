//! Typed response variants and their encoding.
//!
//! # Responsibilities
//! - Define the JSON envelope and the file download handlers return
//! - Encode a handler result into an HTTP response exactly once
//! - Provide the fixed "server busy" response used after retry exhaustion
//!
//! # Wire Shapes
//! ```text
//! success: {"success":true,"code":0,"msg":"","data":<payload>}
//! failure: {"success":false,"code":<int>,"msg":<string>,"data":null}
//! busy:    {"ok":false,"msg":"Server is busy, please try later!"}
//! ```

use std::fmt;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::header::{self, InvalidHeaderValue};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncSeek};

use crate::dispatch::failure::Failure;
use crate::http::content::serve_content;
use crate::http::request::RequestContext;

/// Body sent with status 200 when every attempt hit a transient conflict.
pub const BUSY_BODY: &str = r#"{"ok":false,"msg":"Server is busy, please try later!"}"#;

/// Error type for response encoding.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("json marshal response failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("read file content failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level failure code carried in a failure envelope.
pub trait FailCode {
    fn code(&self) -> i64;
    fn message(&self) -> String;
}

/// Structured success/failure wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub code: i64,
    pub msg: String,
    pub data: serde_json::Value,
}

impl Envelope {
    /// Success envelope around `data`.
    ///
    /// Fails only if `data` cannot be represented as JSON (for example a map
    /// with non-string keys); the failure is a server fault.
    pub fn success<T: Serialize>(data: T) -> Result<Self, Failure> {
        Ok(Self {
            success: true,
            code: 0,
            msg: String::new(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn fail(code: &impl FailCode) -> Self {
        Self::fail_with_msg(code, code.message())
    }

    pub fn fail_with_msg(code: &impl FailCode, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.code(),
            msg: msg.into(),
            data: serde_json::Value::Null,
        }
    }

    fn encode(&self) -> Result<Response, EncodeError> {
        let body = serde_json::to_vec(self)?;
        let mut response = Response::new(Body::from(body));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(response)
    }
}

/// Seekable async byte source for file downloads.
pub trait Content: AsyncRead + AsyncSeek + Send + Unpin + 'static {}

impl<T> Content for T where T: AsyncRead + AsyncSeek + Send + Unpin + 'static {}

/// A file download.
pub struct FileStream {
    pub filename: String,
    pub content: Box<dyn Content>,
    pub modified: SystemTime,
}

impl FileStream {
    pub fn new(filename: impl Into<String>, content: impl Content, modified: SystemTime) -> Self {
        Self {
            filename: filename.into(),
            content: Box::new(content),
            modified,
        }
    }

    async fn encode(self, context: &RequestContext) -> Result<Response, EncodeError> {
        let disposition = HeaderValue::from_str(&format!("attachment; filename={}", self.filename))?;
        let mut response =
            serve_content(context.method(), context.headers(), &self.filename, self.content, self.modified).await?;
        response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
        Ok(response)
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("filename", &self.filename)
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

/// Everything a typed handler can return.
#[derive(Debug)]
pub enum TypedResponse {
    Envelope(Envelope),
    File(FileStream),
}

impl TypedResponse {
    /// Encode into an HTTP response. Consumes the response; nothing is
    /// written until the returned value is handed to the transport.
    pub async fn encode(self, context: &RequestContext) -> Result<Response, EncodeError> {
        match self {
            TypedResponse::Envelope(envelope) => envelope.encode(),
            TypedResponse::File(file) => file.encode(context).await,
        }
    }
}

impl From<Envelope> for TypedResponse {
    fn from(envelope: Envelope) -> Self {
        TypedResponse::Envelope(envelope)
    }
}

impl From<FileStream> for TypedResponse {
    fn from(file: FileStream) -> Self {
        TypedResponse::File(file)
    }
}

/// The degraded response after all attempts hit a transient conflict.
pub fn busy() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        BUSY_BODY,
    )
        .into_response()
}
