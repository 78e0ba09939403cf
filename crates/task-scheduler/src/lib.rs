//! Daily trigger chaining an analysis task and a news evaluation task.

pub mod config;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use config::{AnalysisDefaults, NewsDefaults, SchedulerConfig};
pub use scheduler::{next_fire_after, CurrentTask, SchedulerStatus, TaskScheduler};
