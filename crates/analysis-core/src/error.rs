use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AnalysisError {
    /// True for failures of an external data source or sink (exchange, news, LLM).
    pub fn is_upstream(&self) -> bool {
        matches!(self, AnalysisError::UpstreamUnavailable(_))
    }
}
