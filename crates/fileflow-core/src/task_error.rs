//! Task handler error types
//!
//! A handler reports a task's own failure as a `Failed` outcome. [`TaskError`] is for
//! the cases where the handler could not get that far; the worker loop uses
//! [`TaskError::is_recoverable`] to decide whether to back off before polling again.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The queue store or another collaborator went away. The worker backs off.
    #[error("Task {task_id} interrupted: {reason}")]
    Transient { task_id: Uuid, reason: String },

    /// The task can never be processed. The worker drops it and moves on.
    #[error("Task {task_id} rejected: {reason}")]
    Rejected { task_id: Uuid, reason: String },
}

impl TaskError {
    pub fn transient(task_id: Uuid, reason: impl Into<String>) -> Self {
        TaskError::Transient {
            task_id,
            reason: reason.into(),
        }
    }

    pub fn rejected(task_id: Uuid, reason: impl Into<String>) -> Self {
        TaskError::Rejected {
            task_id,
            reason: reason.into(),
        }
    }

    pub fn task_id(&self) -> Uuid {
        match self {
            TaskError::Transient { task_id, .. } | TaskError::Rejected { task_id, .. } => *task_id,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, TaskError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let id = Uuid::new_v4();

        let err = TaskError::transient(id, "queue store unreachable");
        assert!(err.is_recoverable());
        assert_eq!(err.task_id(), id);
        assert!(err.to_string().contains("queue store unreachable"));

        let err = TaskError::rejected(id, "payload has no temp_path");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains(&id.to_string()));
    }
}
