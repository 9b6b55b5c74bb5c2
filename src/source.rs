//! Byte sources: where the pipeline's input comes from.
//!
//! A [`ByteSource`] reports its declared mime type and size up front and
//! delivers the whole payload with one asynchronous read. The read can fail
//! or be cancelled by the source itself; both are reported through
//! [`ReadOutcome`] rather than a `Result` so the pipeline can tell them apart
//! from its own abort.

use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Result of [`ByteSource::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Bytes(Vec<u8>),
    Failed(String),
    Aborted,
}

/// Asynchronous source of an encoded image.
#[async_trait]
pub trait ByteSource: Send {
    /// Display name, used in logs and reports.
    fn name(&self) -> &str;

    /// Declared mime type, e.g. `image/jpeg`.
    fn mime_type(&self) -> &str;

    /// Declared size in bytes.
    fn size(&self) -> u64;

    async fn read(&mut self) -> ReadOutcome;
}

/// An in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    async fn read(&mut self) -> ReadOutcome {
        ReadOutcome::Bytes(self.bytes.clone())
    }
}

/// Mime type from a path's extension, `application/octet-stream` when unknown.
pub fn mime_type_for_path(path: &Path) -> String {
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// A file on disk, read with `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    mime_type: String,
    size: u64,
}

impl FileSource {
    /// Stat `path` and guess its mime type from the extension.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            name: path.display().to_string(),
            mime_type: mime_type_for_path(&path),
            size: metadata.len(),
            path,
        })
    }

    /// Override the guessed mime type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read(&mut self) -> ReadOutcome {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => ReadOutcome::Bytes(bytes),
            Err(e) => ReadOutcome::Failed(format!("{}: {e}", self.path.display())),
        }
    }
}
