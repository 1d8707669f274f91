//! Content serving for file downloads.
//!
//! # Responsibilities
//! - Conditional requests (`If-Modified-Since` → 304)
//! - Single byte ranges (`Range` → 206 / 416)
//! - Content type from the file name, falling back to a text sniff
//! - Streaming the selected bytes without buffering the whole file
//!
//! # Design Decisions
//! - Multiple ranges are answered with the full content
//! - A zero modification time (the Unix epoch) disables `Last-Modified`

use std::io::SeekFrom;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, SubsecRound, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::http::date::{format_http_date, parse_http_date};
use crate::http::response::{Content, EncodeError};

const CHUNK_SIZE: usize = 32 * 1024;
const SNIFF_LEN: usize = 512;

/// A satisfiable byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.start + self.length - 1, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("invalid range")]
    Invalid,
    #[error("invalid range: failed to overlap")]
    NoOverlap,
}

/// Parse a `Range` header value against a resource of `size` bytes.
pub fn parse_range(value: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    let spec = value.trim().strip_prefix("bytes=").ok_or(RangeError::Invalid)?;
    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = part.split_once('-').ok_or(RangeError::Invalid)?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // Suffix range: the last `end` bytes.
            let suffix: u64 = end.parse().map_err(|_| RangeError::Invalid)?;
            let suffix = suffix.min(size);
            if suffix == 0 {
                no_overlap = true;
                continue;
            }
            ranges.push(ByteRange { start: size - suffix, length: suffix });
            continue;
        }

        let start: u64 = start.parse().map_err(|_| RangeError::Invalid)?;
        if start >= size {
            no_overlap = true;
            continue;
        }
        let end = if end.is_empty() {
            size - 1
        } else {
            let end: u64 = end.parse().map_err(|_| RangeError::Invalid)?;
            if end < start {
                return Err(RangeError::Invalid);
            }
            end.min(size - 1)
        };
        ranges.push(ByteRange { start, length: end - start + 1 });
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }
    Ok(ranges)
}

/// Serve `content` honoring conditional and range headers of the request.
pub async fn serve_content(
    method: &Method,
    headers: &HeaderMap,
    filename: &str,
    mut content: Box<dyn Content>,
    modified: SystemTime,
) -> Result<Response, EncodeError> {
    let size = content.seek(SeekFrom::End(0)).await?;
    let last_modified = (modified != UNIX_EPOCH).then(|| DateTime::<Utc>::from(modified).trunc_subsecs(0));

    let mut response = Response::new(Body::empty());
    if let Some(last_modified) = last_modified {
        response.headers_mut().insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&format_http_date(last_modified))?,
        );
        if is_not_modified(method, headers, last_modified) {
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            return Ok(response);
        }
    }

    content.seek(SeekFrom::Start(0)).await?;
    let content_type = match content_type_by_name(filename) {
        Some(content_type) => content_type,
        None => sniff(&mut content).await?,
    };
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response.headers_mut().insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let mut selected = ByteRange { start: 0, length: size };
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    // An empty file has no satisfiable range; serve it whole.
    if let Some(range) = range.filter(|_| size > 0) {
        match parse_range(range, size) {
            Ok(ranges) if ranges.len() == 1 => {
                selected = ranges[0];
                *response.status_mut() = StatusCode::PARTIAL_CONTENT;
                response.headers_mut().insert(
                    header::CONTENT_RANGE,
                    HeaderValue::from_str(&selected.content_range(size))?,
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(range = %range, error = %err, "Unsatisfiable range");
                *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
                response.headers_mut().insert(
                    header::CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes */{}", size))?,
                );
                return Ok(response);
            }
        }
    }

    response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(selected.length));
    if method != Method::HEAD {
        content.seek(SeekFrom::Start(selected.start)).await?;
        *response.body_mut() = body_stream(content.take(selected.length));
    }
    Ok(response)
}

fn is_not_modified(method: &Method, headers: &HeaderMap, last_modified: DateTime<Utc>) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    if headers.contains_key(header::IF_NONE_MATCH) {
        return false;
    }
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
        .map(|since| last_modified <= since)
        .unwrap_or(false)
}

fn content_type_by_name(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let content_type = match ext.to_ascii_lowercase().as_str() {
        "txt" => "text/plain; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(content_type)
}

/// Peek at the start of the content and guess text or binary. Leaves the
/// cursor at the start.
async fn sniff(content: &mut Box<dyn Content>) -> std::io::Result<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut *content).take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    content.seek(SeekFrom::Start(0)).await?;

    let text = match std::str::from_utf8(&head) {
        Ok(s) => !s.chars().any(|c| c.is_control() && !c.is_whitespace()),
        // A multi-byte character cut off at the sniff boundary is still text.
        Err(e) => e.error_len().is_none() && e.valid_up_to() + 4 > head.len(),
    };
    Ok(if text { "text/plain; charset=utf-8" } else { "application/octet-stream" })
}

fn body_stream<R>(reader: R) -> Body
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let stream = futures_util::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok::<Bytes, std::io::Error>(buf.freeze()), Some(reader))),
            Err(err) => {
                tracing::error!(error = %err, "Read file content failed");
                Some((Err(err), None))
            }
        }
    });
    Body::from_stream(stream)
}
