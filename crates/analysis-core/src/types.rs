use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Quote-currency traded value for the bar
    #[serde(default)]
    pub turnover: f64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Price history keyed by symbol, each series sorted oldest first.
pub type PriceHistory = BTreeMap<String, Vec<Bar>>;

/// Kline interval requested from the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl BarInterval {
    /// Interval code understood by the Bybit v5 kline endpoint
    pub fn exchange_code(&self) -> &'static str {
        match self {
            BarInterval::Hour1 => "60",
            BarInterval::Hour4 => "240",
            BarInterval::Day1 => "D",
            BarInterval::Week1 => "W",
        }
    }

    pub fn to_minutes(&self) -> i64 {
        match self {
            BarInterval::Hour1 => 60,
            BarInterval::Hour4 => 240,
            BarInterval::Day1 => 1440,
            BarInterval::Week1 => 10080,
        }
    }
}

/// Tradable pair metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_coin: String,
    pub quote_coin: String,
    /// Display name, e.g. `BTC/USDT`
    pub name: String,
    /// Traded value over the last 24h, when the source reports it
    #[serde(default)]
    pub turnover_24h: Option<f64>,
}

impl SymbolInfo {
    pub fn new(base_coin: &str, quote_coin: &str) -> Self {
        Self {
            symbol: format!("{}{}", base_coin, quote_coin),
            base_coin: base_coin.to_string(),
            quote_coin: quote_coin.to_string(),
            name: format!("{}/{}", base_coin, quote_coin),
            turnover_24h: None,
        }
    }

    pub fn with_turnover(mut self, turnover: f64) -> Self {
        self.turnover_24h = Some(turnover);
        self
    }
}

/// Strip the `USDT` quote suffix from a pair symbol.
pub fn base_coin_of(symbol: &str) -> &str {
    match symbol.strip_suffix("USDT") {
        Some(base) if !base.is_empty() => base,
        _ => symbol,
    }
}

/// News item attached to a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    pub symbol: String,
}
