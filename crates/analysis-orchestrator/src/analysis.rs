use analysis_core::{stats, BarInterval, ExchangeClient, MarketStore, PriceHistory};
use chrono::Utc;
use factor_engine::FactorRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use task_registry::{AnalysisParams, AnalysisReport, TaskResult};

use crate::{JobError, TaskContext};

/// Bars per symbol handed to the factor registry
pub const DEFAULT_HISTORY_LIMIT: usize = 120;

pub const CURRENT_PRICE_COLUMN: &str = "current_price";
pub const CHANGE_PCT_COLUMN: &str = "change_pct";

/// Symbol refresh, history load and factor ranking
pub struct AnalysisJob {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn MarketStore>,
    factors: Arc<FactorRegistry>,
    history_limit: usize,
}

impl AnalysisJob {
    pub fn new(exchange: Arc<dyn ExchangeClient>, store: Arc<dyn MarketStore>, factors: Arc<FactorRegistry>) -> Self {
        Self {
            exchange,
            store,
            factors,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub async fn run(&self, ctx: &TaskContext, params: &AnalysisParams) -> Result<TaskResult, JobError> {
        ctx.step(0.0, "Starting analysis")?;

        ctx.step(0.05, &format!("Fetching top {} symbols by turnover", params.top_n))?;
        let symbols = self.exchange.top_symbols_by_turnover(params.top_n).await?;
        if symbols.is_empty() {
            return Err(JobError::Failed("Exchange returned no symbols".to_string()));
        }

        ctx.step(0.1, "Saving symbol metadata")?;
        self.store.save_symbols(&symbols).await?;

        let selected: Vec<String> = symbols.iter().take(params.top_n).map(|s| s.symbol.clone()).collect();
        ctx.step(0.15, &format!("Selected {} symbols", selected.len()))?;

        if params.collect_latest_data {
            self.refresh_history(ctx, &selected).await?;
        }

        ctx.step(0.7, "Loading price history")?;
        let history = self.store.load_recent_bars(&selected, self.history_limit).await?;
        tracing::info!(
            "[{}] Loaded history for {}/{} symbols",
            ctx.task_id(),
            history.len(),
            selected.len()
        );

        let label = if params.selected_factors.is_some() { "selected" } else { "all" };
        ctx.step(0.85, &format!("Computing {} factors", label))?;
        let composition = match &params.selected_factors {
            Some(ids) => self.factors.compute_selected(&history, &symbols, ids),
            None => self.factors.compute_all(&history, &symbols),
        };
        if !composition.skipped_factors.is_empty() {
            tracing::warn!(
                "[{}] Skipped unknown factors: {}",
                ctx.task_id(),
                composition.skipped_factors.join(", ")
            );
        }

        ctx.step(0.95, "Formatting results")?;
        let mut table = composition.table;
        let (prices, changes) = latest_prices(&history);
        table.insert_column(CURRENT_PRICE_COLUMN, &prices);
        table.insert_column(CHANGE_PCT_COLUMN, &changes);

        Ok(TaskResult::Analysis(AnalysisReport {
            count: table.rows.len(),
            rows: table.rows,
            extended: None,
            skipped_factors: composition.skipped_factors,
        }))
    }

    /// Fetch and store bars for symbols whose stored history is stale.
    async fn refresh_history(&self, ctx: &TaskContext, symbols: &[String]) -> Result<(), JobError> {
        ctx.step(0.2, "Checking for missing daily bars")?;
        let today = Utc::now().date_naive();
        let missing = self.store.missing_ranges(symbols, today).await?;

        if missing.is_empty() {
            ctx.progress(0.45, "Daily bars already up to date");
            return Ok(());
        }

        ctx.step(0.25, &format!("Fetching history for {} symbols", missing.len()))?;
        let total = missing.len();
        let mut fetched = BTreeMap::new();
        for (i, (symbol, start)) in missing.iter().enumerate() {
            ctx.step(0.25 + 0.2 * i as f64 / total as f64, &format!("Fetching bars: {}", symbol))?;
            match self.exchange.fetch_bars(symbol, *start, today, BarInterval::Day1).await {
                Ok(bars) if !bars.is_empty() => {
                    fetched.insert(symbol.clone(), bars);
                }
                Ok(_) => tracing::debug!("[{}] No new bars for {}", ctx.task_id(), symbol),
                Err(e) => tracing::warn!("[{}] Failed to fetch bars for {}: {}", ctx.task_id(), symbol, e),
            }
        }

        if fetched.is_empty() {
            return Ok(());
        }

        ctx.step(0.45, "Saving daily bars")?;
        let mut written = 0;
        for (symbol, bars) in &fetched {
            written += self.store.save_bars(symbol, bars).await?;
        }
        tracing::info!("[{}] Stored {} bars for {} symbols", ctx.task_id(), written, fetched.len());
        Ok(())
    }
}

/// Last close and its change against the previous close, per symbol
fn latest_prices(history: &PriceHistory) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    let mut prices = BTreeMap::new();
    let mut changes = BTreeMap::new();
    for (symbol, bars) in history {
        let Some(last) = bars.last() else { continue };
        prices.insert(symbol.clone(), last.close);
        if let Some(prev) = bars.len().checked_sub(2).map(|i| &bars[i]) {
            if let Some(change) = stats::pct_change(prev.close, last.close) {
                changes.insert(symbol.clone(), change);
            }
        }
    }
    (prices, changes)
}
