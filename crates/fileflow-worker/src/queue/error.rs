//! Queue error types

use fileflow_core::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue configuration error: {0}")]
    Config(String),

    #[error("Queue connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue operation failed: {0}")]
    Operation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "redis-queue")]
    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[cfg(feature = "redis-queue")]
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Serialization(msg) => AppError::Validation(msg),
            other => AppError::QueueUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileflow_core::ErrorMetadata;

    #[test]
    fn test_connection_error_display() {
        let err = QueueError::Connection("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "Queue connection error: connection refused"
        );
    }

    #[test]
    fn test_maps_to_retryable_app_error() {
        let err = AppError::from(QueueError::Operation("timeout".to_string()));
        assert_eq!(err.error_code(), "QUEUE_UNAVAILABLE");
        assert!(err.is_recoverable());
    }
}
