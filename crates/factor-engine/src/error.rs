use thiserror::Error;

/// Failure of one factor, for one symbol or for the whole batch.
///
/// Always isolated by the registry: the affected cells become missing values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactorError {
    #[error("Insufficient data: need {required} bars, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Calculation error: {0}")]
    Calculation(String),
}
