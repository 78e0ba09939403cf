//! Bybit v5 public market-data client.

mod rate_limit;
pub mod types;

use analysis_core::{AnalysisError, Bar, BarInterval, ExchangeClient, SymbolInfo};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

use rate_limit::{retry_delay, Quota, RateLimiter};
use types::{parse_kline_row, top_usdt_pairs, ApiResponse, KlineRow, ListResult, Ticker};

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
const CATEGORY: &str = "spot";
/// Bybit's maximum page size for klines
const KLINE_PAGE_LIMIT: usize = 1000;
const MAX_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct BybitClient {
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl BybitClient {
    pub fn new(base_url: &str) -> Self {
        // requests per minute
        let rate_limit: usize = std::env::var("BYBIT_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);
        Self::with_rate_limit(base_url, rate_limit)
    }

    pub fn with_rate_limit(base_url: &str, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// GET a v5 endpoint and unwrap its envelope.
    ///
    /// Throttled answers (HTTP 429 or retCode 10006) pause the client until
    /// Bybit's advertised reset and are retried up to `MAX_RETRIES` times.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, AnalysisError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.acquire().await;
            let response = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|e| AnalysisError::UpstreamUnavailable(format!("Bybit {}: {}", path, e)))?;

            let quota = Quota::from_headers(response.headers());
            let now_ms = Utc::now().timestamp_millis();
            if quota.is_exhausted() {
                if let Some(wait) = quota.until_reset(now_ms) {
                    self.rate_limiter.pause_for(wait).await;
                }
            }

            let status = response.status();
            if status != StatusCode::TOO_MANY_REQUESTS {
                if !status.is_success() {
                    return Err(AnalysisError::UpstreamUnavailable(format!(
                        "Bybit {}: HTTP {}: {}",
                        path,
                        status,
                        response.text().await.unwrap_or_default()
                    )));
                }
                let body: ApiResponse<T> = response
                    .json()
                    .await
                    .map_err(|e| AnalysisError::InvalidData(format!("Bybit {}: {}", path, e)))?;
                if !body.is_rate_limited() {
                    return body.into_result();
                }
            }

            if attempt < MAX_RETRIES {
                let delay = retry_delay(&quota, now_ms, attempt);
                tracing::warn!(
                    "Bybit throttled {}, retrying in {:.1}s ({}/{})",
                    path,
                    delay.as_secs_f64(),
                    attempt + 1,
                    MAX_RETRIES
                );
                self.rate_limiter.pause_for(delay).await;
            }
        }

        Err(AnalysisError::UpstreamUnavailable(format!(
            "Bybit {} still throttled after {} retries",
            path, MAX_RETRIES
        )))
    }

    pub async fn get_tickers(&self) -> Result<Vec<Ticker>, AnalysisError> {
        let result: ListResult<Ticker> = self
            .get("/v5/market/tickers", &[("category", CATEGORY.to_string())])
            .await?;
        Ok(result.list)
    }

    /// One kline page ending at `end_ms`, newest first.
    async fn get_kline_page(
        &self,
        symbol: &str,
        interval: BarInterval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<KlineRow>, AnalysisError> {
        let result: ListResult<KlineRow> = self
            .get(
                "/v5/market/kline",
                &[
                    ("category", CATEGORY.to_string()),
                    ("symbol", symbol.to_string()),
                    ("interval", interval.exchange_code().to_string()),
                    ("start", start_ms.to_string()),
                    ("end", end_ms.to_string()),
                    ("limit", KLINE_PAGE_LIMIT.to_string()),
                ],
            )
            .await?;
        Ok(result.list)
    }
}

fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn top_symbols_by_turnover(&self, limit: usize) -> Result<Vec<SymbolInfo>, AnalysisError> {
        let tickers = self.get_tickers().await?;
        let top = top_usdt_pairs(tickers, limit);
        tracing::info!("Fetched top {} USDT pairs by turnover", top.len());
        Ok(top)
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, AnalysisError> {
        if start > end {
            return Ok(Vec::new());
        }
        let start_ms = day_start_ms(start);
        let mut end_ms = day_start_ms(end + ChronoDuration::days(1)) - 1;

        // keyed by start time to drop overlap between pages
        let mut bars: BTreeMap<i64, Bar> = BTreeMap::new();
        loop {
            let page = self.get_kline_page(symbol, interval, start_ms, end_ms).await?;
            let page_len = page.len();

            let mut oldest = i64::MAX;
            for row in &page {
                match parse_kline_row(row) {
                    Ok(bar) => {
                        let ts = bar.timestamp.timestamp_millis();
                        oldest = oldest.min(ts);
                        if ts >= start_ms {
                            bars.insert(ts, bar);
                        }
                    }
                    Err(e) => tracing::warn!("Skipping malformed {} kline: {}", symbol, e),
                }
            }

            if page_len < KLINE_PAGE_LIMIT || oldest == i64::MAX || oldest <= start_ms {
                break;
            }
            end_ms = oldest - 1;
        }

        tracing::debug!("Fetched {} {} bars for {} from {}", bars.len(), interval.exchange_code(), symbol, start);
        Ok(bars.into_values().collect())
    }
}
