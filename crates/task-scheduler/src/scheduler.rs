//! Daily trigger and the bookkeeping of the cycle in flight.
//!
//! Scheduler state sits behind a std `RwLock`; no guard is held across an await.

use analysis_orchestrator::TaskService;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use task_registry::{TaskParams, TaskStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::SchedulerConfig;

/// First instant strictly after `now` whose UTC time of day is `at`.
pub fn next_fire_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    enabled: bool,
    running: bool,
    cycle_active: bool,
    last_run: Option<DateTime<Utc>>,
    current_analysis: Option<String>,
    current_news: Option<String>,
}

/// Task tracked by the cycle in progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTask {
    pub task_id: String,
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub current_analysis_task: Option<CurrentTask>,
    pub current_news_task: Option<CurrentTask>,
}

/// Resets the cycle bookkeeping however the cycle ends
struct CycleGuard<'a> {
    state: &'a RwLock<SchedulerState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.current_analysis = None;
        state.current_news = None;
        state.cycle_active = false;
    }
}

pub struct TaskScheduler {
    service: TaskService,
    config: SchedulerConfig,
    state: RwLock<SchedulerState>,
    shutdown: CancellationToken,
}

impl TaskScheduler {
    pub fn new(service: TaskService, config: SchedulerConfig) -> Self {
        let state = SchedulerState {
            enabled: config.enabled,
            ..Default::default()
        };
        Self {
            service,
            config,
            state: RwLock::new(state),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn service(&self) -> &TaskService {
        &self.service
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Spawn the daily loop. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        {
            let mut state = self.write_state();
            if state.running {
                warn!("Scheduler is already running");
                return None;
            }
            state.running = true;
        }

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            info!("Task scheduler started, daily run at {} UTC", scheduler.config.run_at);
            loop {
                let now = Utc::now();
                let next = next_fire_after(now, scheduler.config.run_at);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                debug!("Next scheduled run at {}", next);

                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                scheduler.run_once().await;
            }
            scheduler.write_state().running = false;
            info!("Task scheduler stopped");
        });
        Some(handle)
    }

    /// Stop the daily loop and any wait in progress. Tasks already created keep running.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.write_state().running = false;
    }

    pub fn enable(&self, enabled: bool) {
        self.write_state().enabled = enabled;
        info!("Scheduled tasks {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.read_state().enabled
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.read_state();
        let describe = |id: &Option<String>| {
            id.as_ref().map(|task_id| {
                let snapshot = self.service.get_task(task_id).ok();
                CurrentTask {
                    task_id: task_id.clone(),
                    status: snapshot.as_ref().map(|s| s.status),
                    progress: snapshot.as_ref().map(|s| s.progress),
                    message: snapshot.map(|s| s.message),
                }
            })
        };

        SchedulerStatus {
            running: state.running,
            enabled: state.enabled,
            last_run: state.last_run,
            next_run: state
                .running
                .then(|| next_fire_after(Utc::now(), self.config.run_at)),
            current_analysis_task: describe(&state.current_analysis),
            current_news_task: describe(&state.current_news),
        }
    }

    /// Request cancellation of the tasks the current cycle is tracking.
    ///
    /// Returns true if at least one task accepted the request.
    pub fn stop_current(&self) -> bool {
        let ids: Vec<String> = {
            let state = self.read_state();
            [&state.current_analysis, &state.current_news]
                .into_iter()
                .flatten()
                .cloned()
                .collect()
        };

        let mut stopped_any = false;
        for id in ids {
            match self.service.request_cancel(&id) {
                Ok(()) => {
                    info!("Requested stop for scheduled task {}", id);
                    stopped_any = true;
                }
                Err(e) => debug!("Scheduled task {} not stopped: {}", id, e),
            }
        }
        stopped_any
    }

    /// One scheduled cycle: analysis, then news evaluation, each awaited.
    ///
    /// Does nothing while disabled or while another cycle is active.
    pub async fn run_once(&self) {
        {
            let mut state = self.write_state();
            if !state.enabled {
                info!("Scheduled tasks are disabled, skipping");
                return;
            }
            if state.cycle_active {
                warn!("Previous scheduled cycle still active, skipping");
                return;
            }
            state.cycle_active = true;
            state.last_run = Some(Utc::now());
        }
        let _guard = CycleGuard { state: &self.state };

        info!("Starting daily scheduled tasks");
        let analysis_id = self.launch(self.config.analysis.to_params());
        self.write_state().current_analysis = Some(analysis_id.clone());
        self.wait_for_task(&analysis_id, "Analysis").await;

        if self.shutdown.is_cancelled() {
            return;
        }

        let news_id = self.launch(self.config.news.to_params());
        self.write_state().current_news = Some(news_id.clone());
        self.wait_for_task(&news_id, "News evaluation").await;

        info!("Daily scheduled tasks finished");
    }

    fn launch(&self, params: TaskParams) -> String {
        let kind = params.kind();
        let id = self.service.create_task(params);
        info!("Created scheduled {} task {}", kind, id);
        id
    }

    /// Poll until the task is terminal, `max_wait` elapses or the scheduler stops.
    async fn wait_for_task(&self, task_id: &str, label: &str) {
        let deadline = tokio::time::Instant::now() + self.config.max_wait;
        loop {
            match self.service.get_task(task_id) {
                Ok(snapshot) if snapshot.is_terminal() => {
                    info!("{} task {} finished with status: {}", label, task_id, snapshot.status);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("{} task {} lookup failed: {}", label, task_id, e);
                    return;
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "{} task {} still running after {:?}, no longer waiting",
                    label, task_id, self.config.max_wait
                );
                return;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SchedulerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SchedulerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
