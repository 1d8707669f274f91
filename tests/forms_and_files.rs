//! Multipart forms and file downloads over a real connection.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use bytes::Bytes;
use jsonhttp::config::ServerConfig;
use jsonhttp::http::{FormRequest, QueryRequest};
use jsonhttp::{Envelope, Failure, FileStream, OrStatus, Routes};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

mod common;

async fn upload(req: FormRequest) -> Result<Envelope, Failure> {
    let form = req.form();
    let title = form.value("title").unwrap_or_default().to_string();
    let file = form
        .file("upload")
        .ok_or_else(|| anyhow::anyhow!("missing upload"))
        .or_bad_request()?;
    let content = file.bytes().await?;

    Envelope::success(json!({
        "title": title,
        "filename": file.filename(),
        "size": file.size(),
        "spilled": file.is_spilled(),
        "content": String::from_utf8_lossy(&content),
    }))
}

fn upload_form(content: String) -> Form {
    Form::new()
        .text("title", "notes")
        .part("upload", Part::text(content).file_name("notes.txt"))
}

#[tokio::test]
async fn form_fields_and_files() {
    let mut routes = Routes::new();
    routes.handle("/upload", upload).unwrap();
    let server = common::start(routes).await;

    let response = reqwest::Client::new()
        .post(server.url("/upload"))
        .multipart(upload_form("hello".to_string()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let envelope: Envelope = response.json().await.unwrap();
    assert_eq!(
        envelope.data,
        json!({
            "title": "notes",
            "filename": "notes.txt",
            "size": 5,
            "spilled": false,
            "content": "hello",
        })
    );
}

#[tokio::test]
async fn large_file_spills_to_disk() {
    let mut routes = Routes::new();
    routes.handle("/upload", upload).unwrap();
    let mut config = ServerConfig::default();
    config.dispatch.multipart_max_memory = 64;
    let server = common::start_with(config, routes).await;

    let content = "abcdefgh".repeat(512);
    let response = reqwest::Client::new()
        .post(server.url("/upload"))
        .multipart(upload_form(content.clone()))
        .send()
        .await
        .unwrap();
    let envelope: Envelope = response.json().await.unwrap();
    assert_eq!(envelope.data["spilled"], true);
    assert_eq!(envelope.data["size"], 4096);
    assert_eq!(envelope.data["content"], content);
}

#[tokio::test]
async fn missing_file_is_400() {
    let mut routes = Routes::new();
    routes.handle("/upload", upload).unwrap();
    let server = common::start(routes).await;

    let response = reqwest::Client::new()
        .post(server.url("/upload"))
        .multipart(Form::new().text("title", "notes"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn truncated_multipart_is_500_without_invoking() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut routes = Routes::new();
    routes
        .handle("/upload", move |req: FormRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            upload(req)
        })
        .unwrap();
    let server = common::start(routes).await;

    // No closing boundary.
    let body = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nnotes";
    let response = reqwest::Client::new()
        .post(server.url("/upload"))
        .header("content-type", "multipart/form-data; boundary=X-BOUNDARY")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[derive(Deserialize)]
struct Download {
    name: String,
}

fn modified() -> SystemTime {
    // Tue, 14 Nov 2023 22:13:20 GMT
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

async fn download(req: QueryRequest) -> Result<FileStream, Failure> {
    let Download { name } = req.decode()?;
    let content = Cursor::new(Bytes::from_static(b"hello world"));
    Ok(FileStream::new(name, content, modified()))
}

async fn download_server() -> common::TestServer {
    let mut routes = Routes::new();
    routes.handle("/download", download).unwrap();
    common::start(routes).await
}

#[tokio::test]
async fn file_download_headers() {
    let server = download_server().await;

    let response = reqwest::get(server.url("/download?name=report.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-disposition"], "attachment; filename=report.txt");
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(headers["content-length"], "11");
    assert_eq!(headers["last-modified"], "Tue, 14 Nov 2023 22:13:20 GMT");
    assert_eq!(headers["accept-ranges"], "bytes");
    assert_eq!(response.text().await.unwrap(), "hello world");
}

#[tokio::test]
async fn unknown_extension_is_sniffed() {
    let server = download_server().await;

    let response = reqwest::get(server.url("/download?name=report")).await.unwrap();
    assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");
}

#[tokio::test]
async fn file_download_range_and_conditional() {
    let server = download_server().await;
    let client = reqwest::Client::new();
    let url = server.url("/download?name=report.txt");

    let response = client.get(&url).header("range", "bytes=6-").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()["content-range"], "bytes 6-10/11");
    assert_eq!(response.text().await.unwrap(), "world");

    let response = client.get(&url).header("range", "bytes=20-30").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()["content-range"], "bytes */11");

    let response = client
        .get(&url)
        .header("if-modified-since", "Wed, 15 Nov 2023 00:00:00 GMT")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = client
        .get(&url)
        .header("if-modified-since", "Mon, 13 Nov 2023 00:00:00 GMT")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
