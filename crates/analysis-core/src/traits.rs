use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::{AnalysisError, Bar, BarInterval, CriterionScore, NewsItem, PriceHistory, Rubric, SymbolInfo};

/// Exchange market-data source
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Top `limit` pairs ordered by recent traded value, highest first.
    async fn top_symbols_by_turnover(&self, limit: usize) -> Result<Vec<SymbolInfo>, AnalysisError>;

    /// Bars for `symbol` covering `start..=end`, oldest first.
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, AnalysisError>;
}

/// Persistence of symbol metadata and daily bars
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn save_symbols(&self, symbols: &[SymbolInfo]) -> Result<(), AnalysisError>;

    /// Upsert bars; returns the number of rows written.
    async fn save_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize, AnalysisError>;

    /// For each symbol whose stored history ends before `today`, the first date to fetch.
    async fn missing_ranges(
        &self,
        symbols: &[String],
        today: NaiveDate,
    ) -> Result<BTreeMap<String, NaiveDate>, AnalysisError>;

    /// Newest `limit` bars per symbol, oldest first. Symbols without bars are absent.
    async fn load_recent_bars(&self, symbols: &[String], limit: usize) -> Result<PriceHistory, AnalysisError>;
}

/// News source keyed by pair symbol
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_news(
        &self,
        symbols: &[String],
        limit_per_symbol: usize,
    ) -> Result<BTreeMap<String, Vec<NewsItem>>, AnalysisError>;
}

/// LLM scoring of free text against a rubric
#[async_trait]
pub trait LlmScorer: Send + Sync {
    /// Per-criterion scores (1-5) in rubric order.
    async fn score_text(&self, model: &str, text: &str, rubric: &Rubric) -> Result<Vec<CriterionScore>, AnalysisError>;
}
