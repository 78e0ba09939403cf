use thiserror::Error;

use crate::TaskStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task not found: {task_id}")]
    NotFound { task_id: String },

    #[error("Task {task_id} is not cancellable (status: {status})")]
    NotCancellable { task_id: String, status: TaskStatus },

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl TaskError {
    pub fn not_found(task_id: &str) -> Self {
        TaskError::NotFound {
            task_id: task_id.to_string(),
        }
    }
}
