//! Route table and handler registration.
//!
//! # Responsibilities
//! - Register typed, event-feed and raw handlers on exact paths
//! - Erase handler types behind boxed futures
//! - Look up the route for a request path
//!
//! # Design Decisions
//! - Immutable after the server is built (thread-safe without locks)
//! - O(1) exact lookup via HashMap; no patterns, no wildcards
//! - Registering a path twice is an error, not an override

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::dispatch::failure::Failure;
use crate::http::request::{RequestKind, RequestVariant, StreamRequest, TypedRequest};
use crate::http::response::TypedResponse;

/// Type-erased typed handler.
pub type TypedHandler = Arc<dyn Fn(TypedRequest) -> BoxFuture<'static, Result<TypedResponse, Failure>> + Send + Sync>;

/// Type-erased event-feed handler.
pub type StreamHandler = Arc<dyn Fn(StreamRequest) -> BoxFuture<'static, Result<(), Failure>> + Send + Sync>;

/// Type-erased raw handler.
pub type RawHandler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Result<Response, Failure>> + Send + Sync>;

/// A typed handler together with the request variant it expects.
#[derive(Clone)]
pub struct TypedRoute {
    kind: RequestKind,
    handler: TypedHandler,
}

impl TypedRoute {
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn handler(&self) -> &TypedHandler {
        &self.handler
    }
}

/// One registered path.
#[derive(Clone)]
pub enum Route {
    Typed(TypedRoute),
    Stream(StreamHandler),
    Raw(RawHandler),
}

/// Error type for handler registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("path {0:?} is already registered")]
    Duplicate(String),

    #[error("path {0:?} must start with '/'")]
    InvalidPath(String),
}

/// Exact-path route table.
#[derive(Clone, Default)]
pub struct Routes {
    table: HashMap<String, Route>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler. The request variant is chosen by the
    /// handler's argument type; the response variant by its return type.
    pub fn handle<R, Res, F, Fut>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        R: RequestVariant,
        Res: Into<TypedResponse>,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, Failure>> + Send + 'static,
    {
        let handler: TypedHandler = Arc::new(
            move |request: TypedRequest| -> BoxFuture<'static, Result<TypedResponse, Failure>> {
                match R::from_typed(request) {
                    Some(request) => handler(request)
                        .map(|result| result.map(Into::<TypedResponse>::into))
                        .boxed(),
                    None => future::ready(Err(Failure::unclassified(anyhow::anyhow!(
                        "request variant does not match the registered handler"
                    ))))
                    .boxed(),
                }
            },
        );
        self.insert(path, Route::Typed(TypedRoute { kind: R::KIND, handler }))
    }

    /// Register an event-feed handler. Never retried.
    pub fn handle_stream<F, Fut>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(StreamRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let handler: StreamHandler = Arc::new(
            move |request: StreamRequest| -> BoxFuture<'static, Result<(), Failure>> { handler(request).boxed() },
        );
        self.insert(path, Route::Stream(handler))
    }

    /// Register a raw handler that builds its own response. Never retried.
    pub fn handle_raw<F, Fut>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Failure>> + Send + 'static,
    {
        let handler: RawHandler = Arc::new(
            move |request: Request<Body>| -> BoxFuture<'static, Result<Response, Failure>> { handler(request).boxed() },
        );
        self.insert(path, Route::Raw(handler))
    }

    /// Look up the route registered for exactly `path`.
    pub fn get(&self, path: &str) -> Option<&Route> {
        self.table.get(path)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn insert(&mut self, path: &str, route: Route) -> Result<&mut Self, RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path.to_string()));
        }
        if self.table.contains_key(path) {
            return Err(RouteError::Duplicate(path.to_string()));
        }
        tracing::debug!(path = %path, "Route registered");
        self.table.insert(path.to_string(), route);
        Ok(self)
    }
}
