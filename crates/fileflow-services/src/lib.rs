//! Fileflow Services Layer
//!
//! Business services on top of the blob store, metadata store and task queue:
//! upload ingestion (inline or queued by size), access control and the file service
//! facade used by the CLI.

pub mod access;
pub mod files;
pub mod ingest;

pub use access::{authorize, can_access, can_read, membership_change, AccessMode};
pub use files::FileService;
pub use ingest::{temp_upload_path, IngestOutcome, IngestSettings, IngestionPipeline};
