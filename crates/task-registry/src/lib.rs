//! In-memory task store and lifecycle state machine.
//!
//! The [`TaskRegistry`] owns every task record and its cancellation signal.
//! Runners mutate records only through the registry; observers read cloned
//! [`TaskSnapshot`]s and can long-poll on the per-task version counter.

pub mod error;
pub mod registry;
pub mod result;
pub mod status;
pub mod task;


pub use error::TaskError;
pub use registry::{NewTask, TaskRegistry, STOPPING_MESSAGE};
pub use result::{AnalysisReport, NewsEvaluation, NewsEvaluationRecord, NewsReport, NewsSummary, TaskResult};
pub use status::TaskStatus;
pub use task::{AnalysisParams, NewsEvaluationParams, TaskKind, TaskParams, TaskSnapshot};
