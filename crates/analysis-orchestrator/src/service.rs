use analysis_core::{ExchangeClient, LlmScorer, MarketStore, NewsSource};
use factor_engine::{FactorInfo, FactorRegistry};
use std::sync::Arc;
use std::time::Duration;
use task_registry::{
    AnalysisParams, NewsEvaluationParams, TaskError, TaskKind, TaskParams, TaskRegistry, TaskResult, TaskSnapshot,
};

use crate::{AnalysisJob, JobError, NewsEvaluationJob, TaskContext};

pub const MAX_ANALYSIS_TOP_N: usize = 50;
pub const MAX_NEWS_TOP_N: usize = 20;
pub const MAX_NEWS_PER_SYMBOL: usize = 10;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Model used when a news request leaves it blank
    pub default_model: String,
    /// Bars per symbol loaded for factor computation
    pub history_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-oss-120b".to_string(),
            history_limit: crate::analysis::DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Entry point for callers: creates tasks, dispatches their runners and
/// answers status queries from the registry.
#[derive(Clone)]
pub struct TaskService {
    registry: Arc<TaskRegistry>,
    factors: Arc<FactorRegistry>,
    analysis: Arc<AnalysisJob>,
    news: Arc<NewsEvaluationJob>,
    config: ServiceConfig,
}

impl TaskService {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn MarketStore>,
        news: Arc<dyn NewsSource>,
        scorer: Arc<dyn LlmScorer>,
        factors: FactorRegistry,
        config: ServiceConfig,
    ) -> Self {
        let factors = Arc::new(factors);
        let analysis = AnalysisJob::new(exchange.clone(), store, factors.clone()).with_history_limit(config.history_limit);
        let news = NewsEvaluationJob::new(exchange, news, scorer);
        Self {
            registry: Arc::new(TaskRegistry::new()),
            factors,
            analysis: Arc::new(analysis),
            news: Arc::new(news),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Create a task and dispatch its runner; returns without waiting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_task(&self, params: TaskParams) -> String {
        let params = self.normalize(params);
        let task = self.registry.create(params.clone());
        let ctx = TaskContext::new(task.id.clone(), self.registry.clone(), task.cancel);

        let job = match params {
            TaskParams::Analysis(p) => Job::Analysis(self.analysis.clone(), p),
            TaskParams::NewsEvaluation(p) => Job::News(self.news.clone(), p),
        };
        tokio::spawn(drive(ctx, job));

        task.id
    }

    pub fn get_task(&self, task_id: &str) -> Result<TaskSnapshot, TaskError> {
        self.registry.get(task_id)
    }

    pub fn request_cancel(&self, task_id: &str) -> Result<(), TaskError> {
        self.registry.request_cancel(task_id)
    }

    pub fn latest_completed_task(&self, kind: Option<TaskKind>) -> Option<TaskSnapshot> {
        self.registry.latest_completed(kind)
    }

    pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
        self.registry.list()
    }

    pub async fn wait_for_change(
        &self,
        task_id: &str,
        since_version: u64,
        timeout: Duration,
    ) -> Result<TaskSnapshot, TaskError> {
        self.registry.wait_for_change(task_id, since_version, timeout).await
    }

    pub fn list_factors(&self) -> Vec<FactorInfo> {
        self.factors.list()
    }

    /// Clamp request sizes and fill in the default model.
    fn normalize(&self, params: TaskParams) -> TaskParams {
        match params {
            TaskParams::Analysis(p) => TaskParams::Analysis(AnalysisParams {
                top_n: p.top_n.clamp(1, MAX_ANALYSIS_TOP_N),
                ..p
            }),
            TaskParams::NewsEvaluation(p) => {
                let model = if p.model.trim().is_empty() {
                    self.config.default_model.clone()
                } else {
                    p.model.trim().to_string()
                };
                TaskParams::NewsEvaluation(NewsEvaluationParams {
                    top_n: p.top_n.clamp(1, MAX_NEWS_TOP_N),
                    news_per_symbol: p.news_per_symbol.clamp(1, MAX_NEWS_PER_SYMBOL),
                    model,
                })
            }
        }
    }
}

enum Job {
    Analysis(Arc<AnalysisJob>, AnalysisParams),
    News(Arc<NewsEvaluationJob>, NewsEvaluationParams),
}

impl Job {
    async fn run(self, ctx: TaskContext) -> Result<TaskResult, JobError> {
        match self {
            Job::Analysis(job, params) => job.run(&ctx, &params).await,
            Job::News(job, params) => job.run(&ctx, &params).await,
        }
    }
}

/// Run one task to a terminal state. Errors and panics in the body become `Failed`.
async fn drive(ctx: TaskContext, job: Job) {
    let registry = ctx.registry().clone();
    let task_id = ctx.task_id().to_string();

    if let Err(e) = registry.start(&task_id) {
        tracing::error!("[{}] Could not start task: {}", task_id, e);
        return;
    }

    let outcome = match tokio::spawn(job.run(ctx)).await {
        Ok(outcome) => outcome,
        Err(e) => Err(JobError::Failed(format!("Task runner aborted: {}", e))),
    };

    let finalized = match outcome {
        Ok(result) => registry.complete(&task_id, result),
        Err(JobError::Cancelled) => {
            tracing::info!("[{}] Task cancelled", task_id);
            registry.cancel_finalize(&task_id)
        }
        Err(JobError::Failed(message)) => {
            tracing::error!("[{}] Task failed: {}", task_id, message);
            registry.fail(&task_id, &message)
        }
    };

    if let Err(e) = finalized {
        tracing::error!("[{}] Could not finalize task: {}", task_id, e);
    }
}
