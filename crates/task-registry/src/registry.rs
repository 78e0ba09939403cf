use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{TaskError, TaskKind, TaskParams, TaskResult, TaskSnapshot, TaskStatus};

/// Message shown while a requested cancellation waits for the next checkpoint
pub const STOPPING_MESSAGE: &str = "Stopping task...";

/// Id and cancellation signal handed to the runner of a freshly created task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub cancel: CancellationToken,
}

struct TaskEntry {
    snapshot: TaskSnapshot,
    created_seq: u64,
    completed_seq: Option<u64>,
}

/// Owner of all task records and their cancellation signals.
///
/// Lock order is always record entry, then signal table; `request_cancel` and
/// the finalising transitions therefore serialise per task id.
pub struct TaskRegistry {
    tasks: DashMap<String, TaskEntry>,
    signals: DashMap<String, CancellationToken>,
    seq: AtomicU64,
    changed: Notify,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            signals: DashMap::new(),
            seq: AtomicU64::new(0),
            changed: Notify::new(),
        }
    }

    /// Insert a `Pending` task with a fresh cancellation signal.
    pub fn create(&self, params: TaskParams) -> NewTask {
        let id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let kind = params.kind();

        let snapshot = TaskSnapshot {
            id: id.clone(),
            kind,
            status: TaskStatus::Pending,
            progress: 0.0,
            message: "Task created".to_string(),
            params,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 1,
        };

        // Signal first: the record must never be visible without one
        self.signals.insert(id.clone(), cancel.clone());
        self.tasks.insert(
            id.clone(),
            TaskEntry {
                snapshot,
                created_seq: self.next_seq(),
                completed_seq: None,
            },
        );
        self.changed.notify_waiters();

        info!("Created {} task {}", kind, id);
        NewTask { id, cancel }
    }

    pub fn get(&self, task_id: &str) -> Result<TaskSnapshot, TaskError> {
        self.tasks
            .get(task_id)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| TaskError::not_found(task_id))
    }

    /// Every task, oldest first
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut entries: Vec<(u64, TaskSnapshot)> = self
            .tasks
            .iter()
            .map(|entry| (entry.created_seq, entry.snapshot.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn status_counts(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.tasks.iter() {
            *counts.entry(entry.snapshot.status).or_insert(0) += 1;
        }
        counts
    }

    /// `Pending -> Running`, on runner pickup.
    pub fn start(&self, task_id: &str) -> Result<(), TaskError> {
        self.mutate(task_id, |snapshot| {
            snapshot.status.validate_transition(task_id, &TaskStatus::Running)?;
            snapshot.status = TaskStatus::Running;
            if !self.stop_requested(task_id) {
                snapshot.message = "Task started".to_string();
            }
            Ok(())
        })
    }

    /// Record runner progress.
    ///
    /// Progress is clamped to [0, 1] and never moves backwards. While a
    /// cancellation is pending the stopping message is kept.
    pub fn update_progress(&self, task_id: &str, progress: f64, message: &str) -> Result<(), TaskError> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::not_found(task_id))?;
        let snapshot = &mut entry.snapshot;

        if snapshot.status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: snapshot.status,
                to: snapshot.status,
            });
        }

        if progress.is_finite() {
            snapshot.progress = snapshot.progress.max(progress.clamp(0.0, 1.0));
        }
        if !self.stop_requested(task_id) {
            snapshot.message = message.to_string();
        }
        snapshot.version += 1;
        drop(entry);

        self.changed.notify_waiters();
        Ok(())
    }

    /// Signal the runner to stop at its next checkpoint.
    ///
    /// Status stays unchanged; only the runner finalises to `Cancelled`.
    pub fn request_cancel(&self, task_id: &str) -> Result<(), TaskError> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::not_found(task_id))?;

        let Some(signal) = self.signals.get(task_id).map(|s| s.value().clone()) else {
            return Err(TaskError::NotCancellable {
                task_id: task_id.to_string(),
                status: entry.snapshot.status,
            });
        };

        signal.cancel();
        entry.snapshot.message = STOPPING_MESSAGE.to_string();
        entry.snapshot.version += 1;
        drop(entry);

        self.changed.notify_waiters();
        info!("Cancellation requested for task {}", task_id);
        Ok(())
    }

    /// Cancel every task that still holds a signal; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.signals.iter().map(|s| s.key().clone()).collect();
        ids.iter().filter(|id| self.request_cancel(id).is_ok()).count()
    }

    pub fn complete(&self, task_id: &str, result: TaskResult) -> Result<(), TaskError> {
        self.finalize(task_id, TaskStatus::Completed, |snapshot| {
            snapshot.progress = 1.0;
            snapshot.message = format!("Task completed with {} results", result.count());
            snapshot.result = Some(result);
        })
    }

    /// Progress and message stay as they were for diagnostics.
    pub fn fail(&self, task_id: &str, error: &str) -> Result<(), TaskError> {
        self.finalize(task_id, TaskStatus::Failed, |snapshot| {
            snapshot.error = Some(error.to_string());
        })
    }

    pub fn cancel_finalize(&self, task_id: &str) -> Result<(), TaskError> {
        self.finalize(task_id, TaskStatus::Cancelled, |snapshot| {
            snapshot.message = "Task cancelled".to_string();
        })
    }

    /// Most recently completed task, optionally of one kind
    pub fn latest_completed(&self, kind: Option<TaskKind>) -> Option<TaskSnapshot> {
        self.tasks
            .iter()
            .filter(|entry| entry.snapshot.status == TaskStatus::Completed)
            .filter(|entry| kind.map_or(true, |k| entry.snapshot.kind == k))
            .filter_map(|entry| entry.completed_seq.map(|seq| (seq, entry.snapshot.clone())))
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, snapshot)| snapshot)
    }

    /// Wait until the task's version exceeds `since_version`, or `timeout` elapses.
    ///
    /// Returns the then-current snapshot either way.
    pub async fn wait_for_change(
        &self,
        task_id: &str,
        since_version: u64,
        timeout: Duration,
    ) -> Result<TaskSnapshot, TaskError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let snapshot = self.get(task_id)?;
            if snapshot.version > since_version {
                return Ok(snapshot);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get(task_id);
            }
        }
    }

    fn finalize<F>(&self, task_id: &str, to: TaskStatus, apply: F) -> Result<(), TaskError>
    where
        F: FnOnce(&mut TaskSnapshot),
    {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::not_found(task_id))?;
        entry.snapshot.status.validate_transition(task_id, &to)?;

        apply(&mut entry.snapshot);
        entry.snapshot.status = to;
        entry.snapshot.completed_at = Some(Utc::now());
        entry.snapshot.version += 1;
        entry.completed_seq = Some(self.next_seq());
        self.signals.remove(task_id);
        drop(entry);

        self.changed.notify_waiters();
        info!("Task {} finished: {}", task_id, to);
        Ok(())
    }

    fn mutate<F>(&self, task_id: &str, apply: F) -> Result<(), TaskError>
    where
        F: FnOnce(&mut TaskSnapshot) -> Result<(), TaskError>,
    {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::not_found(task_id))?;
        apply(&mut entry.snapshot)?;
        entry.snapshot.version += 1;
        debug!("Task {} now {} (v{})", task_id, entry.snapshot.status, entry.snapshot.version);
        drop(entry);

        self.changed.notify_waiters();
        Ok(())
    }

    /// Caller must already hold the record entry.
    fn stop_requested(&self, task_id: &str) -> bool {
        self.signals
            .get(task_id)
            .map(|signal| signal.is_cancelled())
            .unwrap_or(false)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}
