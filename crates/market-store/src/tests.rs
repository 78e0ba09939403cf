use super::*;
use chrono::TimeZone;
use tokio_test::{assert_err, assert_ok};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn bar_on(day: NaiveDate, close: f64) -> Bar {
    Bar {
        timestamp: Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap()),
        open: close - 1.0,
        high: close + 2.0,
        low: close - 2.0,
        close,
        volume: 10.0,
        turnover: close * 10.0,
    }
}

fn series(start: NaiveDate, days: i64) -> Vec<Bar> {
    (0..days)
        .map(|i| bar_on(start + Duration::days(i), 100.0 + i as f64))
        .collect()
}

#[tokio::test]
async fn test_in_memory_store_creation() {
    let store = assert_ok!(SqliteMarketStore::in_memory().await);
    assert!(store.pool().acquire().await.is_ok());
    assert_eq!(store.backfill_days(), DEFAULT_BACKFILL_DAYS);
}

#[tokio::test]
async fn test_save_symbols_upserts() {
    let store = SqliteMarketStore::in_memory().await.unwrap();

    store.save_symbols(&[SymbolInfo::new("BTC", "USDT").with_turnover(1.0e9)]).await.unwrap();
    store.save_symbols(&[SymbolInfo::new("BTC", "USDT").with_turnover(2.0e9)]).await.unwrap();

    let info = store.get_symbol("BTCUSDT").await.unwrap().unwrap();
    assert_eq!(info.name, "BTC/USDT");
    assert_eq!(info.turnover_24h, Some(2.0e9));
    assert!(store.get_symbol("ETHUSDT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_bars_overwrites_same_date() {
    let store = SqliteMarketStore::in_memory().await.unwrap();
    let day = date(2024, 3, 1);

    assert_eq!(store.save_bars("BTCUSDT", &[bar_on(day, 100.0)]).await.unwrap(), 1);
    assert_eq!(store.save_bars("BTCUSDT", &[bar_on(day, 105.0)]).await.unwrap(), 1);
    assert_eq!(store.save_bars("BTCUSDT", &[]).await.unwrap(), 0);

    assert_eq!(store.count_bars("BTCUSDT").await.unwrap(), 1);
    let history = store.load_recent_bars(&["BTCUSDT".to_string()], 10).await.unwrap();
    assert_eq!(history["BTCUSDT"][0].close, 105.0);
}

#[tokio::test]
async fn test_load_recent_bars_newest_window_ascending() {
    let store = SqliteMarketStore::in_memory().await.unwrap();
    store.save_bars("ETHUSDT", &series(date(2024, 1, 1), 30)).await.unwrap();

    let symbols = vec!["ETHUSDT".to_string(), "SOLUSDT".to_string()];
    let history = store.load_recent_bars(&symbols, 5).await.unwrap();

    assert!(!history.contains_key("SOLUSDT"));
    let bars = &history["ETHUSDT"];
    assert_eq!(bars.len(), 5);
    assert_eq!(bars[0].date(), date(2024, 1, 26));
    assert_eq!(bars[4].date(), date(2024, 1, 30));
    assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(bars[4].turnover, 1290.0);
}

#[tokio::test]
async fn test_missing_ranges() {
    let store = SqliteMarketStore::in_memory().await.unwrap();
    let today = date(2024, 6, 30);

    store.save_bars("BTCUSDT", &series(date(2024, 6, 20), 5)).await.unwrap();
    store.save_bars("ETHUSDT", &series(date(2024, 6, 26), 5)).await.unwrap();

    let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "NEWUSDT".to_string()];
    let ranges = store.missing_ranges(&symbols, today).await.unwrap();

    // BTC ends on the 24th, ETH is current, NEW has nothing stored
    assert_eq!(ranges.get("BTCUSDT"), Some(&date(2024, 6, 25)));
    assert!(!ranges.contains_key("ETHUSDT"));
    assert_eq!(ranges.get("NEWUSDT"), Some(&(today - Duration::days(DEFAULT_BACKFILL_DAYS))));
}

#[tokio::test]
async fn test_latest_bar_date() {
    let store = SqliteMarketStore::in_memory().await.unwrap();
    assert_eq!(store.latest_bar_date("BTCUSDT").await.unwrap(), None);

    store.save_bars("BTCUSDT", &series(date(2023, 12, 30), 4)).await.unwrap();
    assert_eq!(store.latest_bar_date("BTCUSDT").await.unwrap(), Some(date(2024, 1, 2)));
}

#[tokio::test]
async fn test_corrupt_date_surfaces_as_database_error() {
    let store = SqliteMarketStore::in_memory().await.unwrap();
    sqlx::query("INSERT INTO daily_bars (symbol, date, open, high, low, close, volume) VALUES ('BADUSDT', 'yesterday', 1, 1, 1, 1, 1)")
        .execute(store.pool())
        .await
        .unwrap();

    let err = assert_err!(store.load_recent_bars(&["BADUSDT".to_string()], 3).await);
    assert!(matches!(err, AnalysisError::DatabaseError(_)));
}

#[tokio::test]
async fn test_file_backed_store_reopens() {
    let path = std::env::temp_dir().join(format!("market-store-{}.db", std::process::id()));
    let url = format!("sqlite:{}", path.display());

    {
        let store = SqliteMarketStore::new(&url, 30).await.unwrap();
        store.save_bars("BTCUSDT", &series(date(2024, 2, 1), 3)).await.unwrap();
        store.pool().close().await;
    }

    let reopened = SqliteMarketStore::new(&url, 30).await.unwrap();
    assert_eq!(reopened.count_bars("BTCUSDT").await.unwrap(), 3);
    assert_eq!(reopened.backfill_days(), 30);
    reopened.pool().close().await;
    let _ = std::fs::remove_file(&path);
}
