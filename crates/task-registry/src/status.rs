use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TaskError;

/// Task lifecycle status.
///
/// ```text
/// Pending -> Running -> Completed | Failed | Cancelled
/// ```
///
/// Terminal states reject every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running),
            Self::Running => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), TaskError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::Cancelled));
        assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(&TaskStatus::Cancelled));
        assert!(!TaskStatus::Running.can_transition_to(&TaskStatus::Running));

        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(&TaskStatus::Running));
            assert!(!terminal.can_transition_to(&TaskStatus::Failed));
        }
    }

    #[test]
    fn test_validate_transition_error() {
        let err = TaskStatus::Completed
            .validate_transition("t-1", &TaskStatus::Running)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition for task t-1: completed -> running");
    }
}
