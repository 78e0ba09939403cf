//! Task dispatch and the two job runners.
//!
//! [`TaskService`] is what callers talk to: it creates tasks in the registry,
//! spawns one runner per task and answers status queries. Runners report
//! progress through a [`TaskContext`] and stop at its checkpoints once
//! cancellation is requested.

pub mod analysis;
pub mod context;
pub mod error;
pub mod news;
pub mod service;


pub use analysis::{AnalysisJob, CHANGE_PCT_COLUMN, CURRENT_PRICE_COLUMN};
pub use context::TaskContext;
pub use error::JobError;
pub use news::{NewsEvaluationJob, NO_DATA_CRITERION, NO_DATA_ERROR};
pub use service::{ServiceConfig, TaskService};
