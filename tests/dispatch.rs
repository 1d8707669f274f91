//! End-to-end tests for typed handlers, retries and the failure boundary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use jsonhttp::config::ServerConfig;
use jsonhttp::dispatch::{SqlStateError, LOCK_NOT_AVAILABLE, SERIALIZATION_FAILURE};
use jsonhttp::http::{FailCode, InboundRequest, JsonRequest, QueryRequest, BUSY_BODY};
use jsonhttp::{Envelope, Failure, OrStatus, Routes};
use serde::{Deserialize, Serialize};
use serde_json::json;

mod common;

#[derive(Deserialize)]
struct Hello {
    name: String,
}

#[derive(Serialize)]
struct Greeting {
    message: String,
}

async fn hello(req: JsonRequest) -> Result<Envelope, Failure> {
    let Hello { name } = req.decode()?;
    if name.is_empty() {
        return Err(Failure::bad_request(anyhow::anyhow!("name is empty")));
    }
    Envelope::success(Greeting {
        message: format!("Hello, {name}."),
    })
}

/// Handler hitting `conflicts` transient conflicts before succeeding.
fn flaky(routes: &mut Routes, path: &str, conflicts: u32, calls: Arc<AtomicU32>) {
    routes
        .handle(path, move |_req: JsonRequest| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < conflicts {
                    return Err(Failure::from(SqlStateError::new(SERIALIZATION_FAILURE, "could not serialize")));
                }
                Envelope::success(json!({ "attempt": n + 1 }))
            }
        })
        .unwrap();
}

#[tokio::test]
async fn hello_round_trip() {
    let mut routes = Routes::new();
    routes.handle("/hello", hello).unwrap();
    let server = common::start(routes).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/hello"))
        .body(r#"{"name":"Ada"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"success":true,"code":0,"msg":"","data":{"message":"Hello, Ada."}}"#
    );

    let response = client
        .post(server.url("/hello"))
        .body(r#"{"name":""}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_invokes_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut routes = Routes::new();
    let counter = calls.clone();
    routes
        .handle("/hello", move |req: JsonRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            hello(req)
        })
        .unwrap();
    let server = common::start(routes).await;

    let response = reqwest::Client::new()
        .post(server.url("/hello"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn conflicts_are_retried_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut routes = Routes::new();
    flaky(&mut routes, "/flaky", 2, calls.clone());
    let server = common::start(routes).await;

    let response = reqwest::Client::new().post(server.url("/flaky")).body("{}").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let envelope: Envelope = response.json().await.unwrap();
    assert_eq!(envelope.data, json!({ "attempt": 3 }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_answer_busy() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut routes = Routes::new();
    flaky(&mut routes, "/flaky", u32::MAX, calls.clone());

    let mut config = ServerConfig::default();
    config.dispatch.max_attempts = 5;
    let server = common::start_with(config, routes).await;

    let response = reqwest::Client::new().post(server.url("/flaky")).body("{}").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), BUSY_BODY);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn explicit_status_wins_over_conflict() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut routes = Routes::new();
    routes
        .handle("/locked", move |_req: JsonRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Err::<Envelope, _>(SqlStateError::new(LOCK_NOT_AVAILABLE, "lock timeout"))
                    .or_status(StatusCode::CONFLICT)
            }
        })
        .unwrap();
    let server = common::start(routes).await;

    let response = reqwest::Client::new().post(server.url("/locked")).body("{}").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panic_answers_500_and_server_survives() {
    let mut routes = Routes::new();
    routes
        .handle("/boom", |_req: JsonRequest| async move {
            if true {
                panic!("handler bug");
            }
            Envelope::success(())
        })
        .unwrap()
        .handle("/hello", hello)
        .unwrap();
    let server = common::start(routes).await;
    let client = reqwest::Client::new();

    let response = client.post(server.url("/boom")).body("{}").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = client
        .post(server.url("/hello"))
        .body(r#"{"name":"Bob"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_path_is_404() {
    let mut routes = Routes::new();
    routes.handle("/hello", hello).unwrap();
    let server = common::start(routes).await;

    let response = reqwest::get(server.url("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "404 page not found");
}

#[tokio::test]
async fn oversized_body_is_413() {
    let mut routes = Routes::new();
    routes.handle("/hello", hello).unwrap();
    let mut config = ServerConfig::default();
    config.dispatch.max_body_bytes = 64;
    let server = common::start_with(config, routes).await;

    let name = "x".repeat(1024);
    let response = reqwest::Client::new()
        .post(server.url("/hello"))
        .body(format!(r#"{{"name":"{name}"}}"#))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[derive(Deserialize)]
struct Lookup {
    id: u64,
}

enum LookupCode {
    NotFound,
}

impl FailCode for LookupCode {
    fn code(&self) -> i64 {
        match self {
            LookupCode::NotFound => 1001,
        }
    }

    fn message(&self) -> String {
        match self {
            LookupCode::NotFound => "no such record".to_string(),
        }
    }
}

async fn lookup(req: QueryRequest) -> Result<Envelope, Failure> {
    let Lookup { id } = req.decode()?;
    if id == 0 {
        return Ok(Envelope::fail(&LookupCode::NotFound));
    }
    Envelope::success(json!({ "id": id, "peer": req.ip() }))
}

#[tokio::test]
async fn query_variant() {
    let mut routes = Routes::new();
    routes.handle("/lookup", lookup).unwrap();
    let server = common::start(routes).await;

    let envelope: Envelope = reqwest::get(server.url("/lookup?id=7")).await.unwrap().json().await.unwrap();
    assert!(envelope.success);
    assert_eq!(envelope.data, json!({ "id": 7, "peer": "127.0.0.1" }));

    let envelope: Envelope = reqwest::get(server.url("/lookup?id=0")).await.unwrap().json().await.unwrap();
    assert!(!envelope.success);
    assert_eq!(envelope.code, 1001);
    assert_eq!(envelope.msg, "no such record");
    assert_eq!(envelope.data, serde_json::Value::Null);

    let response = reqwest::get(server.url("/lookup?id=seven")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn created(_req: Request<Body>) -> Result<Response, Failure> {
    Ok((StatusCode::CREATED, [("x-handled-by", "raw")], "made").into_response())
}

#[tokio::test]
async fn raw_handler_builds_its_own_response() {
    let mut routes = Routes::new();
    routes
        .handle_raw("/raw", created)
        .unwrap()
        .handle_raw("/raw-boom", |_req: Request<Body>| async move {
            Err::<Response, _>(Failure::forbidden(anyhow::anyhow!("not yours")))
        })
        .unwrap();
    let server = common::start(routes).await;
    let client = reqwest::Client::new();

    let response = client.put(server.url("/raw")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-handled-by"], "raw");
    assert_eq!(response.text().await.unwrap(), "made");

    let response = client.get(server.url("/raw-boom")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn raw_conflict_answers_busy_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut routes = Routes::new();
    routes
        .handle_raw("/raw", move |_req: Request<Body>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<Response, _>(Failure::from(SqlStateError::new(SERIALIZATION_FAILURE, "conflict"))) }
        })
        .unwrap();
    let mut config = ServerConfig::default();
    config.dispatch.max_attempts = 5;
    let server = common::start_with(config, routes).await;

    let response = reqwest::get(server.url("/raw")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), BUSY_BODY);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
