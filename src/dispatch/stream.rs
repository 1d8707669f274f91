//! Event-feed dispatch.
//!
//! The handler runs on its own task and writes chunks into a bounded
//! channel; the response body drains that channel. Status and headers are
//! committed when the first chunk arrives, so a failure before it still
//! picks the status, and a failure after it only ends the body.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{stream, FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::ReceiverStream;

use crate::dispatch::classify::Verdict;
use crate::dispatch::engine::Engine;
use crate::dispatch::panic::{catch_panic, Caught, Panic};
use crate::http::request::{RequestContext, StreamRequest};
use crate::http::response::busy;
use crate::observability::metrics;
use crate::routing::StreamHandler;

impl Engine {
    /// Run an event-feed handler. Never retried.
    pub async fn stream(&self, path: &str, handler: &StreamHandler, request: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, _body) = request.into_parts();
        let context = Arc::new(RequestContext::from_parts(&parts));

        let (tx, mut rx) = mpsc::channel::<Bytes>(self.config().stream_buffer);
        let handler = handler.clone();
        let request = StreamRequest::new(context, tx);
        let invocation = async move { handler(request).await }.boxed();
        let task: JoinHandle<Caught<()>> = tokio::spawn(catch_panic(invocation));

        let Some(first) = rx.recv().await else {
            // The writer is gone before anything was written.
            let response = match self.classifier().classify(path, join(task).await) {
                Verdict::Success(()) => event_stream(Body::empty()),
                Verdict::Terminal(status) => status.into_response(),
                Verdict::Retry => busy(),
            };
            metrics::record_request(path, response.status(), start);
            return response;
        };

        let classifier = self.classifier().clone();
        let monitored = path.to_string();
        tokio::spawn(async move {
            // The status is already committed; the verdict is only logged.
            let _ = classifier.classify(&monitored, join(task).await);
            tracing::debug!(path = %monitored, "Event stream finished");
        });

        let chunks = stream::once(async move { first })
            .chain(ReceiverStream::new(rx))
            .map(Ok::<_, Infallible>);
        metrics::record_request(path, StatusCode::OK, start);
        event_stream(Body::from_stream(chunks))
    }
}

async fn join(task: JoinHandle<Caught<()>>) -> Caught<()> {
    task.await.unwrap_or_else(|err| Err(join_panic(err)))
}

fn join_panic(err: JoinError) -> Panic {
    match err.try_into_panic() {
        Ok(payload) => Panic::new(payload, None),
        Err(err) => Panic::new(Box::new(err.to_string()), None),
    }
}

fn event_stream(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}
