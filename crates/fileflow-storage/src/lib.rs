//! Fileflow Storage Library
//!
//! Durable bytes-on-disk for uploaded files. Every blob is written under a
//! server-generated name inside a single [`StorageRoot`]; the returned blob path is
//! relative to that root and is the only handle the metadata layer keeps.
//!
//! # Blob path format
//!
//! `{unix_millis}-{16 hex chars}{.ext}` where `.ext` is the sanitised extension of the
//! user-supplied name. Paths must not contain `..` or start with `/`.

pub mod keys;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use keys::{generate_blob_name, StorageRoot};
pub use local::LocalBlobStore;
pub use traits::{BlobHandle, BlobStore, ByteReader, ByteStream, StorageError, StorageResult};
