//! The dispatch/retry engine.
//!
//! # State Machine
//! ```text
//! Decoding ──decode error──▶ Terminal(decode status)
//!    │
//!    ▼
//! Invoking ──value──▶ Success ──encode──▶ response
//!    │  ▲
//!    │  └── Retry (attempts left, same decoded request)
//!    │
//!    ├──explicit / unclassified failure, panic──▶ Terminal(status)
//!    └──Retry, attempts exhausted──▶ busy body (200)
//! ```
//!
//! Exactly one response leaves the engine per request. Handlers never see
//! the transport on this path, so re-running one after a transient conflict
//! cannot produce a second write.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use crate::config::validation::{validate_dispatch, ValidationError};
use crate::config::DispatchConfig;
use crate::dispatch::classify::{Classifier, SqlStatePredicate, Verdict};
use crate::dispatch::panic::catch_panic;
use crate::http::request::{decode, RequestContext};
use crate::http::response::{busy, TypedResponse};
use crate::observability::metrics;
use crate::routing::{RawHandler, TypedRoute};

/// Runs handlers for one server. Shared read-only by every request.
#[derive(Debug)]
pub struct Engine {
    config: DispatchConfig,
    classifier: Classifier,
}

impl Engine {
    /// Build an engine whose transient predicate matches the configured
    /// SQLSTATE codes.
    pub fn new(config: DispatchConfig) -> Result<Self, Vec<ValidationError>> {
        let classifier = Classifier::new(SqlStatePredicate::new(config.transient_sqlstates.clone()));
        Self::with_classifier(config, classifier)
    }

    /// Build an engine with a caller-supplied classifier.
    pub fn with_classifier(config: DispatchConfig, classifier: Classifier) -> Result<Self, Vec<ValidationError>> {
        validate_dispatch(&config)?;
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub(crate) fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Decode, invoke with retry, and encode.
    pub async fn dispatch(&self, path: &str, route: &TypedRoute, request: Request<Body>) -> Response {
        let start = Instant::now();

        let typed = match decode(route.kind(), request, &self.config).await {
            Ok(typed) => typed,
            Err(err) => {
                let status = err.status();
                tracing::error!(path = %path, error = %err, "Parse request failed");
                metrics::record_request(path, status, start);
                return status.into_response();
            }
        };
        let context = typed.shared_context();
        let max_attempts = self.config.max_attempts;

        for _ in 0..max_attempts {
            metrics::record_attempt(path);
            let handler = route.handler().clone();
            let request = typed.clone();
            let caught = catch_panic(async move { handler(request).await }.boxed()).await;

            match self.classifier.classify(path, caught) {
                Verdict::Success(response) => {
                    let response = self.encode(path, response, &context).await;
                    metrics::record_request(path, response.status(), start);
                    return response;
                }
                Verdict::Terminal(status) => {
                    metrics::record_request(path, status, start);
                    return status.into_response();
                }
                Verdict::Retry => {}
            }
        }

        metrics::record_exhausted(path);
        metrics::record_request(path, StatusCode::OK, start);
        busy()
    }

    /// Run a raw handler inside the failure boundary. Never retried.
    pub async fn raw(&self, path: &str, handler: &RawHandler, request: Request<Body>) -> Response {
        let start = Instant::now();
        let handler = handler.clone();
        let caught = catch_panic(async move { handler(request).await }.boxed()).await;

        let response = match self.classifier.classify(path, caught) {
            Verdict::Success(response) => response,
            Verdict::Terminal(status) => status.into_response(),
            Verdict::Retry => busy(),
        };
        metrics::record_request(path, response.status(), start);
        response
    }

    async fn encode(&self, path: &str, response: TypedResponse, context: &RequestContext) -> Response {
        match response.encode(context).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(path = %path, error = %err, "Encode response failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
