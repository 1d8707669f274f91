//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a single dispatching fallback
//! - Wire up middleware (tracing, body limit, request ID)
//! - Bind server to listener
//! - Hand each request to the dispatch engine by its route kind

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::loader::join_errors;
use crate::config::{validate_config, ServerConfig, ValidationError};
use crate::dispatch::{Classifier, Engine, SqlStatePredicate};
use crate::lifecycle::signals;
use crate::routing::{Route, Routes};

const NOT_FOUND_BODY: &str = "404 page not found";

/// Application state injected into the dispatching handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<Routes>,
    pub engine: Arc<Engine>,
}

/// Error type for building and running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("serve failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("install signal handler failed: {0}")]
    Signal(#[source] std::io::Error),
}

/// HTTP server running the registered handlers.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and routes.
    pub fn new(config: ServerConfig, routes: Routes) -> Result<Self, ServerError> {
        let predicate = SqlStatePredicate::new(config.dispatch.transient_sqlstates.clone());
        Self::with_classifier(config, routes, Classifier::new(predicate))
    }

    /// Create a server whose transient predicate is supplied by the caller.
    pub fn with_classifier(config: ServerConfig, routes: Routes, classifier: Classifier) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ServerError::Config)?;
        let engine = Engine::with_classifier(config.dispatch.clone(), classifier).map_err(ServerError::Config)?;

        let state = AppState {
            routes: Arc::new(routes),
            engine: Arc::new(engine),
        };
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id());

        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.dispatch.max_body_bytes))
            .layer(middleware)
    }

    /// Run the server until `shutdown` fires, accepting connections on the
    /// given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_attempts = self.config.dispatch.max_attempts,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Build a server, bind the configured address and serve until the process
/// receives a termination signal.
pub async fn listen(config: ServerConfig, routes: Routes) -> Result<(), ServerError> {
    let server = HttpServer::new(config, routes)?;
    let listener = TcpListener::bind(&server.config().listener.bind_address)
        .await
        .map_err(ServerError::Bind)?;
    let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

    signals::exit_on_signal().map_err(ServerError::Signal)?;
    tracing::info!(address = %local_addr, "Listening for connections");

    // Never fires; signals end the process directly.
    let (_keep, shutdown) = broadcast::channel(1);
    server.run(listener, shutdown).await.map_err(ServerError::Serve)
}

/// Single entry point for every request.
/// Looks up the exact path and runs the matching route through the engine.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();

    match state.routes.get(&path) {
        Some(Route::Typed(route)) => state.engine.dispatch(&path, route, request).await,
        Some(Route::Stream(handler)) => state.engine.stream(&path, handler, request).await,
        Some(Route::Raw(handler)) => state.engine.raw(&path, handler, request).await,
        None => {
            tracing::debug!(path = %path, "No route matched");
            (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
        }
    }
}
