use analysis_core::{
    AnalysisError, Bar, BarInterval, CriterionScore, ExchangeClient, LlmScorer, MarketStore, NewsItem, NewsSource,
    PriceHistory, Rubric, SymbolInfo,
};
use analysis_orchestrator::{ServiceConfig, TaskService};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use factor_engine::FactorRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use task_registry::{TaskKind, TaskStatus};
use tokio::sync::Semaphore;

use crate::*;

/// Symbol listing waits for a permit, so tests decide when each runner proceeds.
struct GatedExchange {
    permits: Arc<Semaphore>,
}

#[async_trait]
impl ExchangeClient for GatedExchange {
    async fn top_symbols_by_turnover(&self, limit: usize) -> Result<Vec<SymbolInfo>, AnalysisError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AnalysisError::Unknown(e.to_string()))?;
        permit.forget();
        Ok(vec![SymbolInfo::new("BTC", "USDT"), SymbolInfo::new("ETH", "USDT")]
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn fetch_bars(
        &self,
        _symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
        _interval: BarInterval,
    ) -> Result<Vec<Bar>, AnalysisError> {
        Ok(Vec::new())
    }
}

struct EmptyStore;

#[async_trait]
impl MarketStore for EmptyStore {
    async fn save_symbols(&self, _symbols: &[SymbolInfo]) -> Result<(), AnalysisError> {
        Ok(())
    }

    async fn save_bars(&self, _symbol: &str, bars: &[Bar]) -> Result<usize, AnalysisError> {
        Ok(bars.len())
    }

    async fn missing_ranges(
        &self,
        _symbols: &[String],
        _today: NaiveDate,
    ) -> Result<BTreeMap<String, NaiveDate>, AnalysisError> {
        Ok(BTreeMap::new())
    }

    async fn load_recent_bars(&self, _symbols: &[String], _limit: usize) -> Result<PriceHistory, AnalysisError> {
        Ok(PriceHistory::new())
    }
}

struct NoNews;

#[async_trait]
impl NewsSource for NoNews {
    async fn fetch_news(
        &self,
        _symbols: &[String],
        _limit_per_symbol: usize,
    ) -> Result<BTreeMap<String, Vec<NewsItem>>, AnalysisError> {
        Ok(BTreeMap::new())
    }
}

struct OfflineScorer;

#[async_trait]
impl LlmScorer for OfflineScorer {
    async fn score_text(&self, _model: &str, _text: &str, _rubric: &Rubric) -> Result<Vec<CriterionScore>, AnalysisError> {
        Err(AnalysisError::UpstreamUnavailable("offline".to_string()))
    }
}

fn scheduler(permits: usize, max_wait: Duration) -> (Arc<TaskScheduler>, Arc<Semaphore>) {
    let semaphore = Arc::new(Semaphore::new(permits));
    let service = TaskService::new(
        Arc::new(GatedExchange {
            permits: semaphore.clone(),
        }),
        Arc::new(EmptyStore),
        Arc::new(NoNews),
        Arc::new(OfflineScorer),
        FactorRegistry::with_defaults(),
        ServiceConfig::default(),
    );
    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(5),
        max_wait,
        ..Default::default()
    };
    (Arc::new(TaskScheduler::new(service, config)), semaphore)
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

#[test]
fn test_next_fire_after() {
    let midnight = NaiveTime::MIN;
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap();
    assert_eq!(next_fire_after(now, midnight), Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());

    let at = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
    assert_eq!(next_fire_after(now, at), Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap());

    // exactly on the fire time -> next day
    let on_time = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
    assert_eq!(next_fire_after(on_time, midnight), Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn test_disabled_cycle_does_nothing() {
    let (scheduler, _) = scheduler(10, Duration::from_secs(5));
    scheduler.enable(false);
    scheduler.run_once().await;

    let status = scheduler.status();
    assert!(!status.enabled);
    assert!(status.last_run.is_none());
    assert!(scheduler.service_tasks().is_empty());
}

#[tokio::test]
async fn test_cycle_runs_analysis_then_news() {
    let (scheduler, _) = scheduler(10, Duration::from_secs(5));
    scheduler.run_once().await;

    let tasks = scheduler.service_tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].kind, TaskKind::Analysis);
    assert_eq!(tasks[1].kind, TaskKind::NewsEvaluation);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    // news task starts only after analysis finished
    assert!(tasks[1].created_at >= tasks[0].completed_at.unwrap());

    let status = scheduler.status();
    assert!(status.last_run.is_some());
    assert!(status.current_analysis_task.is_none());
    assert!(status.current_news_task.is_none());
}

#[tokio::test]
async fn test_stop_current_cancels_tracked_task() {
    let (scheduler, permits) = scheduler(0, Duration::from_secs(5));
    assert!(!scheduler.stop_current());

    let cycle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_once().await })
    };
    wait_until(|| scheduler.status().current_analysis_task.is_some()).await;

    let current = scheduler.status().current_analysis_task.unwrap();
    assert!(scheduler.stop_current());

    permits.add_permits(2);
    cycle.await.unwrap();

    let tasks = scheduler.service_tasks();
    assert_eq!(tasks[0].id, current.task_id);
    assert_eq!(tasks[0].status, TaskStatus::Cancelled);
    assert_eq!(tasks[1].status, TaskStatus::Completed);
    assert!(scheduler.status().current_analysis_task.is_none());
}

#[tokio::test]
async fn test_wait_timeout_abandons_without_cancelling() {
    let (scheduler, permits) = scheduler(0, Duration::from_millis(30));
    scheduler.run_once().await;

    let tasks = scheduler.service_tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Running));
    assert!(scheduler.status().current_news_task.is_none());

    permits.add_permits(2);
    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    wait_until(|| {
        scheduler
            .service_tasks()
            .iter()
            .filter(|t| ids.contains(&t.id))
            .all(|t| t.status == TaskStatus::Completed)
    })
    .await;
}

#[tokio::test]
async fn test_start_and_stop_loop() {
    let (scheduler, _) = scheduler(10, Duration::from_secs(5));
    let handle = scheduler.start().unwrap();
    assert!(scheduler.start().is_none());

    let status = scheduler.status();
    assert!(status.running);
    assert!(status.next_run.unwrap() > Utc::now());

    scheduler.stop();
    handle.await.unwrap();
    assert!(!scheduler.status().running);
    assert!(scheduler.status().next_run.is_none());
}

impl TaskScheduler {
    fn service_tasks(&self) -> Vec<task_registry::TaskSnapshot> {
        self.service().list_tasks()
    }
}
