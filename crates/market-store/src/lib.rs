//! SQLite persistence of pair metadata and daily bars.
//!
//! The store only ever holds one row per symbol and UTC date; saving a bar for
//! a date that already exists overwrites it.

mod error;

pub use error::{StoreError, StoreResult};

use analysis_core::{AnalysisError, Bar, MarketStore, PriceHistory, SymbolInfo};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Days of history fetched for a symbol that has no stored bars
pub const DEFAULT_BACKFILL_DAYS: i64 = 180;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqliteMarketStore {
    pool: SqlitePool,
    backfill_days: i64,
}

impl SqliteMarketStore {
    /// Open (or create) the database at `database_url` and apply the schema.
    pub async fn new(database_url: &str, backfill_days: i64) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, backfill_days).await
    }

    /// Private in-memory database on a single connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, DEFAULT_BACKFILL_DAYS).await
    }

    async fn with_pool(pool: SqlitePool, backfill_days: i64) -> StoreResult<Self> {
        let store = Self {
            pool,
            backfill_days: backfill_days.max(1),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let schema = include_str!("schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn backfill_days(&self) -> i64 {
        self.backfill_days
    }

    /// Stored metadata for `symbol`, if any.
    pub async fn get_symbol(&self, symbol: &str) -> StoreResult<Option<SymbolInfo>> {
        let row = sqlx::query(
            "SELECT symbol, base_coin, quote_coin, name, turnover_24h FROM crypto_symbols WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> StoreResult<SymbolInfo> {
            Ok(SymbolInfo {
                symbol: r.try_get("symbol")?,
                base_coin: r.try_get("base_coin")?,
                quote_coin: r.try_get("quote_coin")?,
                name: r.try_get("name")?,
                turnover_24h: r.try_get("turnover_24h")?,
            })
        })
        .transpose()
    }

    /// Date of the newest stored bar for `symbol`.
    pub async fn latest_bar_date(&self, symbol: &str) -> StoreResult<Option<NaiveDate>> {
        let latest: Option<String> = sqlx::query_scalar("SELECT MAX(date) FROM daily_bars WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        latest.map(|d| parse_date(symbol, &d)).transpose()
    }

    pub async fn count_bars(&self, symbol: &str) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_bars WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn upsert_symbols(&self, symbols: &[SymbolInfo]) -> StoreResult<()> {
        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for info in symbols {
            sqlx::query(
                r#"
                INSERT INTO crypto_symbols (symbol, base_coin, quote_coin, name, turnover_24h, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol) DO UPDATE SET
                    base_coin = excluded.base_coin,
                    quote_coin = excluded.quote_coin,
                    name = excluded.name,
                    turnover_24h = excluded.turnover_24h,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&info.symbol)
            .bind(&info.base_coin)
            .bind(&info.quote_coin)
            .bind(&info.name)
            .bind(info.turnover_24h)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_bars(&self, symbol: &str, bars: &[Bar]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for bar in bars {
            let result = sqlx::query(
                r#"
                INSERT INTO daily_bars (symbol, date, open, high, low, close, volume, turnover)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, date) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    turnover = excluded.turnover
                "#,
            )
            .bind(symbol)
            .bind(bar.date().format(DATE_FORMAT).to_string())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(bar.turnover)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn recent_bars(&self, symbol: &str, limit: usize) -> StoreResult<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT date, open, high, low, close, volume, turnover
            FROM daily_bars
            WHERE symbol = ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut bars = rows
            .iter()
            .map(|row| bar_from_row(symbol, row))
            .collect::<StoreResult<Vec<_>>>()?;
        bars.reverse();
        Ok(bars)
    }
}

fn parse_date(symbol: &str, raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StoreError::CorruptRow {
        symbol: symbol.to_string(),
        reason: format!("bad date '{}': {}", raw, e),
    })
}

fn bar_from_row(symbol: &str, row: &SqliteRow) -> StoreResult<Bar> {
    let date: String = row.try_get("date")?;
    let timestamp = parse_date(symbol, &date)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| StoreError::CorruptRow {
            symbol: symbol.to_string(),
            reason: format!("date '{}' out of range", date),
        })?;

    Ok(Bar {
        timestamp,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
        turnover: row.try_get("turnover")?,
    })
}

#[async_trait]
impl MarketStore for SqliteMarketStore {
    async fn save_symbols(&self, symbols: &[SymbolInfo]) -> Result<(), AnalysisError> {
        if symbols.is_empty() {
            return Ok(());
        }
        self.upsert_symbols(symbols).await?;
        tracing::debug!("Saved metadata for {} symbols", symbols.len());
        Ok(())
    }

    async fn save_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize, AnalysisError> {
        if bars.is_empty() {
            return Ok(0);
        }
        let written = self.upsert_bars(symbol, bars).await?;
        tracing::debug!("Saved {} bars for {}", written, symbol);
        Ok(written)
    }

    async fn missing_ranges(
        &self,
        symbols: &[String],
        today: NaiveDate,
    ) -> Result<BTreeMap<String, NaiveDate>, AnalysisError> {
        let mut ranges = BTreeMap::new();

        for symbol in symbols {
            match self.latest_bar_date(symbol).await? {
                Some(latest) if latest >= today => {}
                Some(latest) => {
                    ranges.insert(symbol.clone(), latest + Duration::days(1));
                }
                None => {
                    ranges.insert(symbol.clone(), today - Duration::days(self.backfill_days));
                }
            }
        }

        Ok(ranges)
    }

    async fn load_recent_bars(&self, symbols: &[String], limit: usize) -> Result<PriceHistory, AnalysisError> {
        let mut history = PriceHistory::new();
        if limit == 0 {
            return Ok(history);
        }

        for symbol in symbols {
            let bars = self.recent_bars(symbol, limit).await?;
            if !bars.is_empty() {
                history.insert(symbol.clone(), bars);
            }
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests;
