//! Blob store abstraction
//!
//! This module defines the [`BlobStore`] trait that the ingestion pipeline and the
//! file service write through.

use async_trait::async_trait;
use bytes::Bytes;
use fileflow_core::AppError;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob path: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked blob content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Reader consumed by [`BlobStore::put_stream`].
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(format!("Blob not found: {}", path)),
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Location of a durably written blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    /// Generated file name, unique within the store.
    pub stored_name: String,
    /// Path relative to the storage root; pass back to `read`/`remove`.
    pub blob_path: String,
    pub size_bytes: u64,
}

/// Durable blob storage.
///
/// Writes never overwrite an existing blob: every `put` allocates a fresh name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `data` under a new name derived from `original_name`'s extension.
    /// The blob is flushed to disk before this returns.
    async fn put(&self, original_name: &str, data: Bytes) -> StorageResult<BlobHandle>;

    /// Persist everything `reader` yields until EOF.
    async fn put_stream(
        &self,
        original_name: &str,
        reader: ByteReader,
    ) -> StorageResult<BlobHandle>;

    /// Read a whole blob. `NotFound` if absent.
    async fn read(&self, blob_path: &str) -> StorageResult<Bytes>;

    /// Read a blob as a stream of chunks. `NotFound` if absent.
    async fn read_stream(&self, blob_path: &str) -> StorageResult<ByteStream>;

    /// Delete a blob. An already-absent blob is treated as success.
    async fn remove(&self, blob_path: &str) -> StorageResult<()>;

    async fn exists(&self, blob_path: &str) -> StorageResult<bool>;

    /// Size in bytes of an existing blob.
    async fn size(&self, blob_path: &str) -> StorageResult<u64>;

    fn backend_name(&self) -> &'static str;
}
