use crate::keys::{generate_blob_name, StorageRoot};
use crate::traits::{BlobHandle, BlobStore, ByteReader, ByteStream, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem blob store
#[derive(Clone)]
pub struct LocalBlobStore {
    root: StorageRoot,
}

impl LocalBlobStore {
    /// Create the store, creating `base_path` if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalBlobStore {
            root: StorageRoot::new(base_path),
        })
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Allocate a fresh blob name and open it with `create_new` so an existing blob is
    /// never overwritten. Retries once on the (unlikely) name collision.
    async fn create_blob_file(&self, original_name: &str) -> StorageResult<(String, PathBuf, fs::File)> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let stored_name = generate_blob_name(original_name);
            let path = self.root.resolve(&stored_name)?;

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((stored_name, path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempts < 3 => {
                    tracing::warn!(stored_name = %stored_name, "Blob name collision, regenerating");
                }
                Err(e) => {
                    return Err(StorageError::WriteFailed(format!(
                        "Failed to create file {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }

    async fn discard_partial(path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove partially written blob"
                );
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, original_name: &str, data: Bytes) -> StorageResult<BlobHandle> {
        let start = std::time::Instant::now();
        let (stored_name, path, mut file) = self.create_blob_file(original_name).await?;
        let size = data.len() as u64;

        let write_result = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = write_result {
            drop(file);
            Self::discard_partial(&path).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to write file {}: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            path = %path.display(),
            stored_name = %stored_name,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob written"
        );

        Ok(BlobHandle {
            blob_path: stored_name.clone(),
            stored_name,
            size_bytes: size,
        })
    }

    async fn put_stream(
        &self,
        original_name: &str,
        mut reader: ByteReader,
    ) -> StorageResult<BlobHandle> {
        let start = std::time::Instant::now();
        let (stored_name, path, mut file) = self.create_blob_file(original_name).await?;

        let copy_result = async {
            let copied = tokio::io::copy(&mut reader, &mut file).await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(copied)
        }
        .await;

        let bytes_copied = match copy_result {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                Self::discard_partial(&path).await;
                return Err(StorageError::WriteFailed(format!(
                    "Failed to write stream to file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        tracing::info!(
            path = %path.display(),
            stored_name = %stored_name,
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob stream written"
        );

        Ok(BlobHandle {
            blob_path: stored_name.clone(),
            stored_name,
            size_bytes: bytes_copied,
        })
    }

    async fn read(&self, blob_path: &str) -> StorageResult<Bytes> {
        let path = self.root.resolve(blob_path)?;

        match fs::read(&path).await {
            Ok(data) => {
                tracing::debug!(
                    path = %path.display(),
                    size_bytes = data.len(),
                    "Blob read"
                );
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(blob_path.to_string()))
            }
            Err(e) => Err(StorageError::ReadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn read_stream(&self, blob_path: &str) -> StorageResult<ByteStream> {
        let path = self.root.resolve(blob_path)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(blob_path.to_string()))
            }
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let key = blob_path.to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(blob_path = %key, error = %e, "Blob stream read error");
                StorageError::ReadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn remove(&self, blob_path: &str) -> StorageResult<()> {
        let path = self.root.resolve(blob_path)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Blob removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(blob_path = %blob_path, "Blob already absent on remove");
                Ok(())
            }
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, blob_path: &str) -> StorageResult<bool> {
        let path = self.root.resolve(blob_path)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn size(&self, blob_path: &str) -> StorageResult<u64> {
        let path = self.root.resolve(blob_path)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(blob_path.to_string()))
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileflow_core::AppError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_read_round_trip() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let handle = store
            .put("notes.txt", Bytes::from_static(b"test data"))
            .await
            .unwrap();

        assert!(handle.stored_name.ends_with(".txt"));
        assert_eq!(handle.blob_path, handle.stored_name);
        assert_eq!(handle.size_bytes, 9);
        assert!(dir.path().join(&handle.blob_path).exists());

        let data = store.read(&handle.blob_path).await.unwrap();
        assert_eq!(&data[..], b"test data");
        assert_eq!(store.size(&handle.blob_path).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_same_name_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let first = store.put("a.bin", Bytes::from_static(b"one")).await.unwrap();
        let second = store.put("a.bin", Bytes::from_static(b"two")).await.unwrap();

        assert_ne!(first.blob_path, second.blob_path);
        assert_eq!(&store.read(&first.blob_path).await.unwrap()[..], b"one");
        assert_eq!(&store.read(&second.blob_path).await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn test_empty_blob() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let handle = store.put("empty.txt", Bytes::new()).await.unwrap();
        assert_eq!(handle.size_bytes, 0);
        assert!(store.read(&handle.blob_path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let result = store.read("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = store.remove("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = store.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let handle = store.put("x.txt", Bytes::from_static(b"x")).await.unwrap();
        store.remove(&handle.blob_path).await.unwrap();
        assert!(!store.exists(&handle.blob_path).await.unwrap());

        assert!(store.remove(&handle.blob_path).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let err = store.read("1700000000000-0000000000000000.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(matches!(AppError::from(err), AppError::NotFound(_)));

        assert!(matches!(
            store.read_stream("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();

        let data = vec![7u8; 200_000];
        let reader: ByteReader = Box::pin(std::io::Cursor::new(data.clone()));
        let handle = store.put_stream("big.bin", reader).await.unwrap();
        assert_eq!(handle.size_bytes, data.len() as u64);

        let mut stream = store.read_stream(&handle.blob_path).await.unwrap();
        let mut downloaded = Vec::new();
        while let Some(chunk) = stream.next().await {
            downloaded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(data, downloaded);
    }

    #[tokio::test]
    async fn test_unwritable_root_fails() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("root")).await.unwrap();
        std::fs::remove_dir_all(dir.path().join("root")).unwrap();

        let err = store.put("a.txt", Bytes::from_static(b"a")).await.unwrap_err();
        assert!(matches!(err, StorageError::WriteFailed(_)));
        assert!(matches!(AppError::from(err), AppError::Storage(_)));
    }
}
