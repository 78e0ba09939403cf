use chrono::NaiveTime;
use std::time::Duration;
use task_registry::{AnalysisParams, NewsEvaluationParams, TaskParams};

/// Parameters of the scheduled analysis task
#[derive(Debug, Clone)]
pub struct AnalysisDefaults {
    pub top_n: usize,
    pub selected_factors: Option<Vec<String>>,
    pub collect_latest_data: bool,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            top_n: 20,
            selected_factors: None,
            collect_latest_data: true,
        }
    }
}

impl AnalysisDefaults {
    pub fn to_params(&self) -> TaskParams {
        TaskParams::Analysis(AnalysisParams {
            top_n: self.top_n,
            selected_factors: self.selected_factors.clone(),
            collect_latest_data: self.collect_latest_data,
        })
    }
}

/// Parameters of the scheduled news evaluation task
#[derive(Debug, Clone)]
pub struct NewsDefaults {
    pub top_n: usize,
    pub news_per_symbol: usize,
    pub model: String,
}

impl Default for NewsDefaults {
    fn default() -> Self {
        Self {
            top_n: 10,
            news_per_symbol: 3,
            model: "gpt-oss-120b".to_string(),
        }
    }
}

impl NewsDefaults {
    pub fn to_params(&self) -> TaskParams {
        TaskParams::NewsEvaluation(NewsEvaluationParams {
            top_n: self.top_n,
            news_per_symbol: self.news_per_symbol,
            model: self.model.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Daily fire time, UTC
    pub run_at: NaiveTime,
    /// Interval between task status polls while waiting
    pub poll_interval: Duration,
    /// Give up waiting on a task after this long (the task keeps running)
    pub max_wait: Duration,
    /// Initial value of the enabled flag
    pub enabled: bool,
    pub analysis: AnalysisDefaults,
    pub news: NewsDefaults,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::MIN,
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(3600),
            enabled: true,
            analysis: AnalysisDefaults::default(),
            news: NewsDefaults::default(),
        }
    }
}
