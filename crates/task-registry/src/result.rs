use analysis_core::{CriterionScore, NewsItem};
use factor_engine::FactorRow;
use serde::{Deserialize, Serialize};

/// Ranked factor table produced by an analysis task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub rows: Vec<FactorRow>,
    pub count: usize,
    /// Reserved for follow-up enrichment; always null today
    pub extended: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_factors: Vec<String>,
}

/// LLM evaluation of one symbol's news
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvaluation {
    /// Sum of criterion scores over the maximum attainable, as a percentage
    pub overall_score: f64,
    pub detailed_scores: Vec<CriterionScore>,
    pub top_criterion: String,
    pub top_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvaluationRecord {
    pub symbol: String,
    pub base_coin: String,
    pub news_count: usize,
    pub evaluation: NewsEvaluation,
    pub news_summary: String,
    pub news_items: Vec<NewsItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NewsEvaluationRecord {
    pub fn overall_score(&self) -> f64 {
        self.evaluation.overall_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSummary {
    pub total_symbols: usize,
    pub total_news: usize,
    pub evaluation_model: String,
    pub top_performer: Option<NewsEvaluationRecord>,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsReport {
    pub data: Vec<NewsEvaluationRecord>,
    pub count: usize,
    pub summary: NewsSummary,
}

/// Kind-specific task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    Analysis(AnalysisReport),
    NewsEvaluation(NewsReport),
}

impl TaskResult {
    pub fn count(&self) -> usize {
        match self {
            TaskResult::Analysis(report) => report.count,
            TaskResult::NewsEvaluation(report) => report.count,
        }
    }
}
