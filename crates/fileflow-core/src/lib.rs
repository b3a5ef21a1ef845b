//! Fileflow Core Library
//!
//! This crate provides the domain models, error types, configuration and validation
//! shared by the storage, metadata, queue and service crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod task_error;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, IngestConfig, QueueBackendKind, QueueConfig, WorkerConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    FileFilters, FileRecord, NewFileRecord, Page, PageRequest, Permission, PrincipalId,
    QueuedUpload, SortField, SortOrder, TaskState, TaskStatus, TaskStatusView, UploadTaskPayload,
    Visibility,
};
pub use task_error::TaskError;
