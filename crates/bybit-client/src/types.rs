use analysis_core::{AnalysisError, Bar, SymbolInfo};
use chrono::{TimeZone, Utc};
use serde::Deserialize;

pub(crate) const QUOTE_COIN: &str = "USDT";

/// retCode Bybit returns with HTTP 200 when the IP is over its request limit
pub const RET_CODE_TOO_MANY_VISITS: i64 = 10006;

/// Bybit v5 response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_rate_limited(&self) -> bool {
        self.ret_code == RET_CODE_TOO_MANY_VISITS
    }

    pub fn into_result(self) -> Result<T, AnalysisError> {
        if self.ret_code != 0 {
            return Err(AnalysisError::UpstreamUnavailable(format!(
                "Bybit retCode {}: {}",
                self.ret_code, self.ret_msg
            )));
        }
        self.result
            .ok_or_else(|| AnalysisError::InvalidData("Bybit response without result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ListResult<T> {
    #[serde(default)]
    pub list: Vec<T>,
}

/// Spot ticker; Bybit encodes numbers as strings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,
    #[serde(default)]
    pub last_price: String,
    #[serde(default)]
    pub turnover24h: String,
}

/// `[startTime, open, high, low, close, volume, turnover]`, newest first
pub type KlineRow = Vec<String>;

/// USDT pairs ordered by 24h turnover, highest first.
pub fn top_usdt_pairs(tickers: Vec<Ticker>, limit: usize) -> Vec<SymbolInfo> {
    let mut pairs: Vec<(SymbolInfo, f64)> = tickers
        .into_iter()
        .filter_map(|t| {
            let base = t.symbol.strip_suffix(QUOTE_COIN)?;
            if base.is_empty() {
                return None;
            }
            let turnover: f64 = t.turnover24h.parse().ok()?;
            Some((SymbolInfo::new(base, QUOTE_COIN).with_turnover(turnover), turnover))
        })
        .collect();

    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pairs.into_iter().take(limit).map(|(info, _)| info).collect()
}

pub fn parse_kline_row(row: &KlineRow) -> Result<Bar, AnalysisError> {
    if row.len() < 6 {
        return Err(AnalysisError::InvalidData(format!("kline row with {} fields", row.len())));
    }
    let num = |i: usize| -> Result<f64, AnalysisError> {
        row[i]
            .parse::<f64>()
            .map_err(|e| AnalysisError::InvalidData(format!("kline field {} '{}': {}", i, row[i], e)))
    };

    let start_ms: i64 = row[0]
        .parse()
        .map_err(|e| AnalysisError::InvalidData(format!("kline start '{}': {}", row[0], e)))?;
    let timestamp = Utc
        .timestamp_millis_opt(start_ms)
        .single()
        .ok_or_else(|| AnalysisError::InvalidData(format!("kline start out of range: {}", start_ms)))?;

    Ok(Bar {
        timestamp,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
        turnover: if row.len() > 6 { num(6)? } else { 0.0 },
    })
}
