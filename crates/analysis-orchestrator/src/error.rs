use analysis_core::AnalysisError;
use thiserror::Error;

/// How a runner body ended when it did not produce a result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Task cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl From<AnalysisError> for JobError {
    fn from(e: AnalysisError) -> Self {
        JobError::Failed(e.to_string())
    }
}
