//! Request budget for Bybit's per-IP limit.
//!
//! Requests are spaced client-side by a sliding window. Bybit also reports its
//! own view of the quota on every response; once that says the quota is spent,
//! or the server answers 429 / retCode 10006, the whole client pauses until the
//! reset instant it advertised.

use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub(crate) const LIMIT_STATUS_HEADER: &str = "x-bapi-limit-status";
pub(crate) const LIMIT_RESET_HEADER: &str = "x-bapi-limit-reset-timestamp";

const MIN_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Quota fields Bybit attaches to API responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Quota {
    /// Requests left in the current window
    pub remaining: Option<u64>,
    /// Window reset, epoch milliseconds
    pub reset_at_ms: Option<i64>,
}

impl Quota {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        let number = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
        Self {
            remaining: number(LIMIT_STATUS_HEADER).and_then(|v| v.parse().ok()),
            reset_at_ms: number(LIMIT_RESET_HEADER).and_then(|v| v.parse().ok()),
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Time from `now_ms` until the advertised reset, if one was sent.
    pub(crate) fn until_reset(&self, now_ms: i64) -> Option<Duration> {
        let reset = self.reset_at_ms?;
        Some(Duration::from_millis(reset.saturating_sub(now_ms).max(0) as u64))
    }
}

/// Wait before retry `attempt` (0-based) of a throttled request.
///
/// Uses the reset timestamp when Bybit sent one, else doubles from one second.
pub(crate) fn retry_delay(quota: &Quota, now_ms: i64, attempt: u32) -> Duration {
    let delay = quota
        .until_reset(now_ms)
        .unwrap_or_else(|| Duration::from_secs(1u64 << attempt.min(5)));
    delay.clamp(MIN_BACKOFF, MAX_BACKOFF)
}

#[derive(Default)]
struct Budget {
    sent: VecDeque<Instant>,
    paused_until: Option<Instant>,
}

#[derive(Clone)]
pub(crate) struct RateLimiter {
    budget: Arc<Mutex<Budget>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            budget: Arc::new(Mutex::new(Budget::default())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Wait for a request slot, honouring any server-imposed pause.
    pub(crate) async fn acquire(&self) {
        loop {
            let mut budget = self.budget.lock().await;
            let now = Instant::now();

            let wake_at = match budget.paused_until {
                Some(until) if until > now => Some(until),
                _ => {
                    budget.paused_until = None;
                    while budget
                        .sent
                        .front()
                        .is_some_and(|front| now.duration_since(*front) >= self.window)
                    {
                        budget.sent.pop_front();
                    }
                    match budget.sent.front() {
                        Some(oldest) if budget.sent.len() >= self.max_requests => Some(*oldest + self.window),
                        _ => None,
                    }
                }
            };

            let Some(wake_at) = wake_at else {
                budget.sent.push_back(now);
                return;
            };
            drop(budget);
            tracing::debug!(
                "Bybit request budget spent, waiting {:.1}s",
                wake_at.saturating_duration_since(now).as_secs_f64()
            );
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// Hold back every request of this client for `delay`.
    pub(crate) async fn pause_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut budget = self.budget.lock().await;
        budget.paused_until = Some(budget.paused_until.map_or(until, |current| current.max(until)));
    }
}
