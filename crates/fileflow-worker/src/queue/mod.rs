//! Task queue: FIFO submission plus per-task progress and state on one shared store.
//!
//! Every operation reports failure softly (`false`, `None` or 0) and logs it, so
//! producers and pollers never see store errors as panics. Callers that must
//! distinguish "empty" from "unreachable" use [`TaskQueue::try_dequeue`].

mod backend;
mod error;
mod memory;
mod postgres;
#[cfg(feature = "redis-queue")]
mod redis;

pub use backend::QueueBackend;
pub use error::QueueError;
pub use memory::MemoryQueueBackend;
pub use postgres::PgQueueBackend;
#[cfg(feature = "redis-queue")]
pub use redis::RedisQueueBackend;

use std::sync::Arc;
use std::time::Duration;

use fileflow_core::constants::{
    progress, DEFAULT_TASK_RETENTION_SECS, PROGRESS_KEY_PREFIX, TASK_STATE_KEY_PREFIX,
};
use fileflow_core::TaskState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone)]
pub struct TaskQueue {
    backend: Arc<dyn QueueBackend>,
    /// Lifetime of progress and state entries after their last write.
    retention: Duration,
}

impl TaskQueue {
    pub fn new(backend: Arc<dyn QueueBackend>, retention: Duration) -> Self {
        Self { backend, retention }
    }

    /// Queue over a fresh in-process backend with default retention.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryQueueBackend::new()),
            Duration::from_secs(DEFAULT_TASK_RETENTION_SECS),
        )
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Serialize `payload` and append it to `queue`. Returns whether it was stored.
    #[tracing::instrument(skip(self, payload))]
    pub async fn enqueue<P: Serialize>(&self, queue: &str, payload: &P) -> bool {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, queue = %queue, "Failed to serialize task payload");
                return false;
            }
        };

        match self.backend.push(queue, json).await {
            Ok(()) => {
                tracing::debug!(queue = %queue, "Task enqueued");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, queue = %queue, "Failed to enqueue task");
                false
            }
        }
    }

    /// Pop and decode the head of `queue`.
    ///
    /// A payload that fails to decode has already been removed from the queue; it is
    /// reported as a serialization error and not retried.
    pub async fn try_dequeue<P: DeserializeOwned>(
        &self,
        queue: &str,
    ) -> Result<Option<P>, QueueError> {
        match self.backend.pop(queue).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Non-blocking pop. Empty queues and store errors both read as `None`.
    pub async fn dequeue<P: DeserializeOwned>(&self, queue: &str) -> Option<P> {
        match self.try_dequeue(queue).await {
            Ok(item) => item,
            Err(e) => {
                tracing::error!(error = %e, queue = %queue, "Failed to dequeue task");
                None
            }
        }
    }

    /// Record progress for a task. Values above 100 are rejected.
    pub async fn set_progress(&self, task_id: Uuid, value: u8) -> bool {
        if value > progress::DONE {
            tracing::warn!(task_id = %task_id, value, "Rejected out-of-range progress value");
            return false;
        }

        let key = format!("{PROGRESS_KEY_PREFIX}{task_id}");
        match self
            .backend
            .set_value(&key, value.to_string(), Some(self.retention))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Failed to record progress");
                false
            }
        }
    }

    /// Last recorded progress, or 0 when absent, expired, or unreadable.
    pub async fn get_progress(&self, task_id: Uuid) -> u8 {
        let key = format!("{PROGRESS_KEY_PREFIX}{task_id}");
        match self.backend.get_value(&key).await {
            Ok(Some(raw)) => raw.parse::<u8>().unwrap_or_else(|_| {
                tracing::warn!(task_id = %task_id, raw = %raw, "Malformed progress value");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Failed to read progress");
                0
            }
        }
    }

    pub async fn set_state(&self, task_id: Uuid, state: &TaskState) -> bool {
        let key = format!("{TASK_STATE_KEY_PREFIX}{task_id}");
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Failed to serialize task state");
                return false;
            }
        };

        match self
            .backend
            .set_value(&key, json, Some(self.retention))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Failed to record task state");
                false
            }
        }
    }

    pub async fn get_state(&self, task_id: Uuid) -> Option<TaskState> {
        let key = format!("{TASK_STATE_KEY_PREFIX}{task_id}");
        match self.backend.get_value(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!(error = %e, task_id = %task_id, "Malformed task state");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Failed to read task state");
                None
            }
        }
    }

    pub async fn len(&self, queue: &str) -> Result<u64, QueueError> {
        self.backend.len(queue).await
    }

    pub async fn purge_expired(&self) -> Result<u64, QueueError> {
        self.backend.purge_expired().await
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Job {
        n: u32,
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_fifo() {
        let queue = TaskQueue::in_memory();
        assert!(queue.enqueue("jobs", &Job { n: 1 }).await);
        assert!(queue.enqueue("jobs", &Job { n: 2 }).await);
        assert_eq!(queue.len("jobs").await.unwrap(), 2);

        assert_eq!(queue.dequeue::<Job>("jobs").await, Some(Job { n: 1 }));
        assert_eq!(queue.dequeue::<Job>("jobs").await, Some(Job { n: 2 }));
        assert_eq!(queue.dequeue::<Job>("jobs").await, None);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let queue = TaskQueue::new(backend.clone(), Duration::from_secs(60));
        backend.push("jobs", "not json".to_string()).await.unwrap();

        let result = queue.try_dequeue::<Job>("jobs").await;
        assert!(matches!(result, Err(QueueError::Serialization(_))));
        assert_eq!(queue.len("jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_progress_round_trip_and_defaults() {
        let queue = TaskQueue::in_memory();
        let task_id = Uuid::new_v4();

        assert_eq!(queue.get_progress(task_id).await, 0);
        assert!(queue.set_progress(task_id, 30).await);
        assert_eq!(queue.get_progress(task_id).await, 30);
        assert!(!queue.set_progress(task_id, 101).await);
        assert_eq!(queue.get_progress(task_id).await, 30);
    }

    #[tokio::test]
    async fn test_progress_expires() {
        let queue = TaskQueue::new(
            Arc::new(MemoryQueueBackend::new()),
            Duration::from_millis(20),
        );
        let task_id = Uuid::new_v4();
        assert!(queue.set_progress(task_id, 100).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(queue.get_progress(task_id).await, 0);
        assert_eq!(queue.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let queue = TaskQueue::in_memory();
        let task_id = Uuid::new_v4();
        assert_eq!(queue.get_state(task_id).await, None);

        let state = TaskState::Completed { record_id: task_id };
        assert!(queue.set_state(task_id, &state).await);
        assert_eq!(queue.get_state(task_id).await, Some(state));
    }

    #[tokio::test]
    async fn test_unavailable_store_reads_soft() {
        let backend = Arc::new(MemoryQueueBackend::new());
        let queue = TaskQueue::new(backend.clone(), Duration::from_secs(60));
        let task_id = Uuid::new_v4();
        assert!(queue.set_progress(task_id, 60).await);

        backend.set_unavailable(true);
        assert!(!queue.enqueue("jobs", &Job { n: 1 }).await);
        assert_eq!(queue.dequeue::<Job>("jobs").await, None);
        assert_eq!(queue.get_progress(task_id).await, 0);
        assert!(!queue.set_progress(task_id, 90).await);
        assert!(queue.health_check().await.is_err());
    }
}
