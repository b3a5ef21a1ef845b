//! Task handler trait
//!
//! The service layer implements this for its ingestion pipeline. The worker loop
//! decodes each queued payload into `Payload` and calls `handle`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use fileflow_core::{TaskError, TaskState};

/// Final state of one processed task, broadcast to in-process subscribers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub state: TaskState,
}

/// Processes one dequeued payload.
///
/// A task that fails on its own merits is still `Ok` with a `Failed` state. `Err` is
/// reserved for failures of the handler's collaborators; recoverable ones make the
/// worker back off before polling again.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    async fn handle(&self, payload: Self::Payload) -> Result<TaskOutcome, TaskError>;
}
