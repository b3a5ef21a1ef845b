//! Configuration module
//!
//! Configuration is read from environment variables (after loading `.env` via
//! `dotenvy`), falling back to the defaults in [`crate::constants`].

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    ALLOW_ANY_CONTENT_TYPE, DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_LARGE_FILE_THRESHOLD_BYTES,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_QUEUE_NAME, DEFAULT_TASK_RETENTION_SECS,
    DEFAULT_WORKER_CONCURRENCY, DEFAULT_WORKER_ERROR_BACKOFF_MS, DEFAULT_WORKER_POLL_INTERVAL_MS,
};

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Store backing the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    /// Process-local; only useful for tests and single-process runs.
    Memory,
    Postgres,
    Redis,
}

impl FromStr for QueueBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(QueueBackendKind::Memory),
            "postgres" | "postgresql" => Ok(QueueBackendKind::Postgres),
            "redis" => Ok(QueueBackendKind::Redis),
            _ => Err(anyhow::anyhow!("Invalid queue backend: {}", s)),
        }
    }
}

impl Display for QueueBackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            QueueBackendKind::Memory => write!(f, "memory"),
            QueueBackendKind::Postgres => write!(f, "postgres"),
            QueueBackendKind::Redis => write!(f, "redis"),
        }
    }
}

/// Settings shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// `text` or `json`
    pub log_format: String,
}

/// Upload routing and validation settings
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub storage_root: PathBuf,
    pub upload_temp_dir: PathBuf,
    pub large_file_threshold_bytes: u64,
    pub max_upload_bytes: u64,
    /// Lowercase mime essences. Empty means every content type is accepted.
    pub allowed_content_types: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data/blobs"),
            upload_temp_dir: PathBuf::from("./data/uploads"),
            large_file_threshold_bytes: DEFAULT_LARGE_FILE_THRESHOLD_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub backend: QueueBackendKind,
    pub redis_url: Option<String>,
    pub queue_name: String,
    pub task_retention_secs: u64,
}

impl QueueConfig {
    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackendKind::Postgres,
            redis_url: None,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            task_retention_secs: DEFAULT_TASK_RETENTION_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub concurrency: usize,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_WORKER_POLL_INTERVAL_MS,
            error_backoff_ms: DEFAULT_WORKER_ERROR_BACKOFF_MS,
            concurrency: DEFAULT_WORKER_CONCURRENCY,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub database_url: String,
    pub ingest: IngestConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_or = |key: &str, default: u64| -> Result<u64, anyhow::Error> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer: {}", key, e)),
                None => Ok(default),
            }
        };

        let base = BaseConfig {
            environment: lookup("ENVIRONMENT")
                .or_else(|| lookup("APP_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: lookup("DB_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
        };

        let ingest_defaults = IngestConfig::default();
        let ingest = IngestConfig {
            storage_root: lookup("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(ingest_defaults.storage_root),
            upload_temp_dir: lookup("UPLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(ingest_defaults.upload_temp_dir),
            large_file_threshold_bytes: parse_or(
                "LARGE_FILE_THRESHOLD_BYTES",
                DEFAULT_LARGE_FILE_THRESHOLD_BYTES,
            )?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            allowed_content_types: match lookup("ALLOWED_CONTENT_TYPES") {
                Some(raw) if raw.trim() == ALLOW_ANY_CONTENT_TYPE => Vec::new(),
                Some(raw) => raw
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                None => ingest_defaults.allowed_content_types,
            },
        };

        let queue = QueueConfig {
            backend: match lookup("QUEUE_BACKEND") {
                Some(raw) => raw.parse()?,
                None => QueueBackendKind::Postgres,
            },
            redis_url: lookup("REDIS_URL"),
            queue_name: lookup("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            task_retention_secs: parse_or("TASK_RETENTION_SECS", DEFAULT_TASK_RETENTION_SECS)?,
        };

        let worker = WorkerConfig {
            poll_interval_ms: parse_or("WORKER_POLL_INTERVAL_MS", DEFAULT_WORKER_POLL_INTERVAL_MS)?,
            error_backoff_ms: parse_or("WORKER_ERROR_BACKOFF_MS", DEFAULT_WORKER_ERROR_BACKOFF_MS)?,
            concurrency: parse_or("WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY as u64)?
                as usize,
        };

        let config = Config {
            base,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            ingest,
            queue,
            worker,
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.ingest.large_file_threshold_bytes > self.ingest.max_upload_bytes {
            return Err(anyhow::anyhow!(
                "LARGE_FILE_THRESHOLD_BYTES ({}) must not exceed MAX_UPLOAD_BYTES ({})",
                self.ingest.large_file_threshold_bytes,
                self.ingest.max_upload_bytes
            ));
        }

        if self.queue.queue_name.trim().is_empty() {
            return Err(anyhow::anyhow!("QUEUE_NAME cannot be empty"));
        }

        if self.queue.backend == QueueBackendKind::Redis && self.queue.redis_url.is_none() {
            return Err(anyhow::anyhow!(
                "REDIS_URL must be set when QUEUE_BACKEND=redis"
            ));
        }

        if self.queue.task_retention_secs == 0 {
            return Err(anyhow::anyhow!("TASK_RETENTION_SECS must be greater than 0"));
        }

        if self.worker.concurrency == 0 {
            return Err(anyhow::anyhow!("WORKER_CONCURRENCY must be at least 1"));
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "WORKER_POLL_INTERVAL_MS must be greater than 0"
            ));
        }

        if !matches!(self.base.log_format.as_str(), "text" | "json") {
            return Err(anyhow::anyhow!("LOG_FORMAT must be 'text' or 'json'"));
        }

        Ok(())
    }
}
