use analysis_core::AnalysisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row for {symbol}: {reason}")]
    CorruptRow { symbol: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        AnalysisError::DatabaseError(err.to_string())
    }
}
