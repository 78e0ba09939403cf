use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskResult, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Analysis,
    NewsEvaluation,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Analysis => write!(f, "analysis"),
            TaskKind::NewsEvaluation => write!(f, "news_evaluation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub top_n: usize,
    /// `None` runs every registered factor
    #[serde(default)]
    pub selected_factors: Option<Vec<String>>,
    /// Refresh stale history from the exchange before computing
    #[serde(default)]
    pub collect_latest_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvaluationParams {
    pub top_n: usize,
    pub news_per_symbol: usize,
    pub model: String,
}

/// Immutable input snapshot, tagged by task kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskParams {
    Analysis(AnalysisParams),
    NewsEvaluation(NewsEvaluationParams),
}

impl TaskParams {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskParams::Analysis(_) => TaskKind::Analysis,
            TaskParams::NewsEvaluation(_) => TaskKind::NewsEvaluation,
        }
    }
}

/// Point-in-time copy of a task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: f64,
    pub message: String,
    pub params: TaskParams,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped on every mutation
    pub version: u64,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
