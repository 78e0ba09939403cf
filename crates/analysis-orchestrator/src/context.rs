use std::sync::Arc;
use task_registry::TaskRegistry;
use tokio_util::sync::CancellationToken;

use crate::JobError;

/// Runner-side handle on one task: progress reporting and cancellation checkpoints
#[derive(Clone)]
pub struct TaskContext {
    task_id: String,
    registry: Arc<TaskRegistry>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(task_id: String, registry: Arc<TaskRegistry>, cancel: CancellationToken) -> Self {
        Self {
            task_id,
            registry,
            cancel,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn progress(&self, progress: f64, message: &str) {
        tracing::info!("[{}] {:.0}% {}", self.task_id, progress * 100.0, message);
        if let Err(e) = self.registry.update_progress(&self.task_id, progress, message) {
            tracing::warn!("[{}] Progress update rejected: {}", self.task_id, e);
        }
    }

    /// Report progress, then stop here if cancellation was requested.
    pub fn step(&self, progress: f64, message: &str) -> Result<(), JobError> {
        self.progress(progress, message);
        self.checkpoint()
    }

    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            tracing::info!("[{}] Cancellation observed at checkpoint", self.task_id);
            return Err(JobError::Cancelled);
        }
        Ok(())
    }
}
