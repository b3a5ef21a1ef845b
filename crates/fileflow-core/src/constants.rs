//! Application-wide constants.

/// Uploads strictly larger than this many bytes are routed through the task queue.
pub const DEFAULT_LARGE_FILE_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;

/// Hard cap on a single upload.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Queue used for large-file ingestion when `QUEUE_NAME` is not set.
pub const DEFAULT_QUEUE_NAME: &str = "file-processing";

/// Key prefix for task progress entries in the queue store.
pub const PROGRESS_KEY_PREFIX: &str = "progress:";

/// Key prefix for task state entries in the queue store.
pub const TASK_STATE_KEY_PREFIX: &str = "task_state:";

/// Progress checkpoints reported by the queued ingestion branch.
pub mod progress {
    pub const STARTED: u8 = 10;
    pub const SOURCE_READ: u8 = 30;
    pub const BLOB_WRITTEN: u8 = 60;
    pub const METADATA_PERSISTED: u8 = 90;
    pub const DONE: u8 = 100;
}

pub const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_WORKER_ERROR_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 1;

/// Progress and state entries expire this long after their last write.
pub const DEFAULT_TASK_RETENTION_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Maximum length of a user-supplied file name.
pub const MAX_ORIGINAL_NAME_LENGTH: usize = 255;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Content types accepted when `ALLOWED_CONTENT_TYPES` is not set.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] =
    &["image/jpeg", "image/png", "application/pdf", "text/plain"];

/// `ALLOWED_CONTENT_TYPES` value that accepts every content type.
pub const ALLOW_ANY_CONTENT_TYPE: &str = "*";
