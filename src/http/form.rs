//! Multipart form parsing.
//!
//! The whole form is parsed before the handler runs so a retried invocation
//! sees exactly the same fields. Values and file parts are kept in memory up
//! to a budget; a file part that would overflow the budget is spilled to a
//! temporary file which lives as long as the form.

use std::collections::HashMap;
use std::io;

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{FromRequest, Multipart};
use axum::http::Request;
use bytes::{Bytes, BytesMut};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Error type for multipart parsing.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("not a multipart request: {0}")]
    Rejection(#[from] MultipartRejection),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("multipart: message too large")]
    TooLarge,

    #[error("spill multipart file to disk failed: {0}")]
    Spill(#[from] io::Error),
}

/// A parsed multipart form.
#[derive(Debug, Default)]
pub struct MultipartForm {
    values: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<FormFile>>,
}

impl MultipartForm {
    /// All non-file values, keyed by field name.
    pub fn values(&self) -> &HashMap<String, Vec<String>> {
        &self.values
    }

    /// All file parts, keyed by field name.
    pub fn files(&self) -> &HashMap<String, Vec<FormFile>> {
        &self.files
    }

    /// First value of the named field.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name)?.first().map(String::as_str)
    }

    /// First file of the named field.
    pub fn file(&self, name: &str) -> Option<&FormFile> {
        self.files.get(name)?.first()
    }
}

/// An uploaded file part.
#[derive(Debug)]
pub struct FormFile {
    filename: String,
    content_type: Option<String>,
    size: u64,
    content: FileContent,
}

#[derive(Debug)]
enum FileContent {
    Memory(Bytes),
    Disk(NamedTempFile),
}

impl FormFile {
    /// The client-supplied file name.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the part was spilled to a temporary file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.content, FileContent::Disk(_))
    }

    /// Read the whole part.
    pub async fn bytes(&self) -> io::Result<Bytes> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(bytes.clone()),
            FileContent::Disk(file) => tokio::fs::read(file.path()).await.map(Bytes::from),
        }
    }

    /// Open the part for streaming reads.
    pub async fn open(&self) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            FileContent::Disk(file) => Ok(Box::new(tokio::fs::File::open(file.path()).await?)),
        }
    }
}

/// Parse a multipart request, keeping at most `max_memory` bytes in memory.
pub async fn parse_form(request: Request<Body>, max_memory: usize) -> Result<MultipartForm, FormError> {
    let mut multipart = Multipart::from_request(request, &()).await?;
    let mut form = MultipartForm::default();
    let mut remaining = max_memory;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match field.file_name().map(str::to_owned) {
            Some(filename) => {
                let content_type = field.content_type().map(str::to_owned);
                let (content, size) = read_file(field, &mut remaining).await?;
                form.files.entry(name).or_default().push(FormFile {
                    filename,
                    content_type,
                    size,
                    content,
                });
            }
            None => {
                let value = read_value(field, &mut remaining).await?;
                form.values.entry(name).or_default().push(value);
            }
        }
    }

    tracing::debug!(
        values = form.values.len(),
        files = form.files.len(),
        in_memory = max_memory - remaining,
        "Multipart form parsed"
    );
    Ok(form)
}

async fn read_value(mut field: Field<'_>, remaining: &mut usize) -> Result<String, FormError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > *remaining {
            return Err(FormError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    *remaining -= buf.len();
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn read_file(mut field: Field<'_>, remaining: &mut usize) -> Result<(FileContent, u64), FormError> {
    let mut buf = BytesMut::new();
    let mut spill: Option<(NamedTempFile, tokio::fs::File)> = None;
    let mut size = 0u64;

    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        if let Some((_, writer)) = spill.as_mut() {
            writer.write_all(&chunk).await?;
            continue;
        }
        if buf.len() + chunk.len() > *remaining {
            let file = NamedTempFile::new()?;
            let mut writer = tokio::fs::File::from_std(file.reopen()?);
            writer.write_all(&buf).await?;
            writer.write_all(&chunk).await?;
            buf.clear();
            spill = Some((file, writer));
        } else {
            buf.extend_from_slice(&chunk);
        }
    }

    match spill {
        Some((file, mut writer)) => {
            writer.flush().await?;
            tracing::debug!(path = ?file.path(), size, "Multipart file spilled to disk");
            Ok((FileContent::Disk(file), size))
        }
        None => {
            *remaining -= buf.len();
            Ok((FileContent::Memory(buf.freeze()), size))
        }
    }
}
