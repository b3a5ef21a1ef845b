use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::PrincipalId;
use crate::validation::{validate_mime_type, validate_original_name};

/// Descriptor pushed onto the queue for a large upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadTaskPayload {
    pub task_id: Uuid,
    /// Temporary location of the client's bytes; removed once the record exists.
    pub temp_path: PathBuf,
    pub owner_id: PrincipalId,
    pub original_name: String,
    pub mime_type: String,
    pub declared_size: u64,
}

impl UploadTaskPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.task_id.is_nil() {
            return Err(AppError::Validation("task_id is required".to_string()));
        }
        if self.owner_id.is_nil() {
            return Err(AppError::Validation("owner_id is required".to_string()));
        }
        if self.temp_path.as_os_str().is_empty() {
            return Err(AppError::Validation("temp_path is required".to_string()));
        }
        validate_original_name(&self.original_name)?;
        validate_mime_type(&self.mime_type)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle of a queued upload as recorded in the queue store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed { record_id: Uuid },
    Failed { error: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Queued => TaskStatus::Queued,
            TaskState::Running => TaskStatus::Running,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

/// Immediate answer to a large upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedUpload {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Progress and state of a task as seen by a polling client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStatusView {
    pub task_id: Uuid,
    pub progress: u8,
    /// `None` once the entry expired or if the task id is unknown.
    pub state: Option<TaskState>,
}
