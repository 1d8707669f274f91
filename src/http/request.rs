//! Typed request variants and their decoding.
//!
//! # Responsibilities
//! - Capture per-request metadata (peer IP, method, URI, headers)
//! - Turn a raw request into exactly one [`TypedRequest`] variant
//! - Offer a uniform decode-into-target operation on each variant
//!
//! # Design Decisions
//! - The body is read exactly once, before the handler runs
//! - JSON and query decoding are lazy and fail with 400 at the call site
//! - Multipart forms are parsed eagerly; a parse failure is a server fault
//! - Variants are cheap to clone so a retried invocation sees the same input

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::config::DispatchConfig;
use crate::dispatch::failure::{Failure, OrStatus};
use crate::http::form::{parse_form, FormError, MultipartForm};

/// Metadata of one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    peer_ip: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        let peer_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();

        Self {
            peer_ip,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }

    /// Peer IP address, empty when the transport did not provide one.
    pub fn peer_ip(&self) -> &str {
        &self.peer_ip
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Capabilities shared by every request variant.
pub trait InboundRequest {
    fn context(&self) -> &RequestContext;

    fn ip(&self) -> &str {
        self.context().peer_ip()
    }

    fn method(&self) -> &Method {
        self.context().method()
    }

    fn uri(&self) -> &Uri {
        self.context().uri()
    }

    fn headers(&self) -> &HeaderMap {
        self.context().headers()
    }
}

fn decode_query<T: DeserializeOwned>(uri: &Uri) -> Result<T, Failure> {
    Query::<T>::try_from_uri(uri)
        .map(|Query(value)| value)
        .map_err(|rejection| Failure::bad_request(anyhow::Error::msg(rejection.body_text())))
}

/// Request with a JSON body.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    context: Arc<RequestContext>,
    body: Bytes,
}

impl JsonRequest {
    /// Deserialize the body. Malformed JSON fails with 400.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        serde_json::from_slice(&self.body).or_bad_request()
    }

    /// The raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Request carrying its arguments in the query string.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    context: Arc<RequestContext>,
}

impl QueryRequest {
    /// Deserialize the query string. Malformed or missing required fields
    /// fail with 400.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        decode_query(self.uri())
    }
}

/// Request with a parsed multipart form.
#[derive(Debug, Clone)]
pub struct FormRequest {
    context: Arc<RequestContext>,
    form: Arc<MultipartForm>,
}

impl FormRequest {
    pub fn form(&self) -> &MultipartForm {
        &self.form
    }
}

/// Request of an event-feed handler.
///
/// Owns the only writer of the response body. Every chunk is sent as its
/// own body frame, in order.
#[derive(Debug)]
pub struct StreamRequest {
    context: Arc<RequestContext>,
    writer: mpsc::Sender<Bytes>,
}

/// The client went away; nothing more can be written.
#[derive(Debug, thiserror::Error)]
#[error("event stream closed by peer")]
pub struct StreamClosed;

impl StreamRequest {
    pub(crate) fn new(context: Arc<RequestContext>, writer: mpsc::Sender<Bytes>) -> Self {
        Self { context, writer }
    }

    /// Deserialize the query string. Malformed or missing required fields
    /// fail with 400.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        decode_query(self.uri())
    }

    /// Write one chunk, waiting until the transport has taken the previous
    /// one.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), StreamClosed> {
        self.writer.send(chunk.into()).await.map_err(|_| StreamClosed)
    }

    /// Write `data` as one server-sent event.
    pub async fn write_event(&self, data: &str) -> Result<(), StreamClosed> {
        let mut frame = String::with_capacity(data.len() + 8);
        for line in data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        self.write(frame).await
    }
}

/// Tag of a [`TypedRequest`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Json,
    Query,
    Form,
}

/// A decoded request of any typed-handler variant.
#[derive(Debug, Clone)]
pub enum TypedRequest {
    Json(JsonRequest),
    Query(QueryRequest),
    Form(FormRequest),
}

impl TypedRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            TypedRequest::Json(_) => RequestKind::Json,
            TypedRequest::Query(_) => RequestKind::Query,
            TypedRequest::Form(_) => RequestKind::Form,
        }
    }

    pub(crate) fn shared_context(&self) -> Arc<RequestContext> {
        match self {
            TypedRequest::Json(r) => r.context.clone(),
            TypedRequest::Query(r) => r.context.clone(),
            TypedRequest::Form(r) => r.context.clone(),
        }
    }
}

/// A request variant a typed handler can accept.
pub trait RequestVariant: InboundRequest + Clone + Send + Sync + 'static {
    const KIND: RequestKind;

    /// Unwrap the matching variant.
    fn from_typed(request: TypedRequest) -> Option<Self>;
}

macro_rules! request_variant {
    ($ty:ident, $kind:ident) => {
        impl InboundRequest for $ty {
            fn context(&self) -> &RequestContext {
                &self.context
            }
        }

        impl RequestVariant for $ty {
            const KIND: RequestKind = RequestKind::$kind;

            fn from_typed(request: TypedRequest) -> Option<Self> {
                match request {
                    TypedRequest::$kind(r) => Some(r),
                    _ => None,
                }
            }
        }
    };
}

request_variant!(JsonRequest, Json);
request_variant!(QueryRequest, Query);
request_variant!(FormRequest, Form);

impl InboundRequest for StreamRequest {
    fn context(&self) -> &RequestContext {
        &self.context
    }
}

impl InboundRequest for TypedRequest {
    fn context(&self) -> &RequestContext {
        match self {
            TypedRequest::Json(r) => r.context(),
            TypedRequest::Query(r) => r.context(),
            TypedRequest::Form(r) => r.context(),
        }
    }
}

/// Error type for request decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("read request body failed: {0}")]
    Body(#[source] axum::Error),

    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("parse request multipart form failed: {0}")]
    Form(#[from] FormError),
}

impl DecodeError {
    /// Status to respond with. Decode errors are never retried.
    pub fn status(&self) -> StatusCode {
        match self {
            DecodeError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DecodeError::Body(_) | DecodeError::Form(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Decode a raw request into the variant `kind`.
pub async fn decode(
    kind: RequestKind,
    request: Request<Body>,
    config: &DispatchConfig,
) -> Result<TypedRequest, DecodeError> {
    let (parts, body) = request.into_parts();
    let context = Arc::new(RequestContext::from_parts(&parts));

    match kind {
        RequestKind::Json => {
            let body = read_body(body, config.max_body_bytes).await?;
            Ok(TypedRequest::Json(JsonRequest { context, body }))
        }
        RequestKind::Query => Ok(TypedRequest::Query(QueryRequest { context })),
        RequestKind::Form => {
            let form = parse_form(Request::from_parts(parts, body), config.multipart_max_memory).await?;
            Ok(TypedRequest::Form(FormRequest {
                context,
                form: Arc::new(form),
            }))
        }
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, DecodeError> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        if is_length_limit(&err) {
            DecodeError::TooLarge { limit }
        } else {
            DecodeError::Body(err)
        }
    })
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err as &(dyn StdError + 'static));
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}
