use analysis_core::{Bar, PriceHistory, SymbolInfo};
use chrono::{Duration, TimeZone, Utc};

use crate::*;

fn trending_bars(start: f64, daily_growth: f64, days: usize) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    (0..days)
        .map(|i| {
            // small wiggle keeps the high/low range and return std non-zero
            let wiggle = if i % 2 == 0 { 1.01 } else { 0.99 };
            let close = start * (1.0 + daily_growth).powi(i as i32) * wiggle;
            Bar {
                timestamp: t0 + Duration::days(i as i64),
                open: close,
                high: close * 1.02,
                low: close * 0.98,
                close,
                volume: 1_000.0,
                turnover: close * 1_000.0,
            }
        })
        .collect()
}

fn history() -> PriceHistory {
    let mut history = PriceHistory::new();
    history.insert("BTCUSDT".to_string(), trending_bars(100.0, 0.01, 60));
    history.insert("ETHUSDT".to_string(), trending_bars(50.0, -0.01, 60));
    history.insert("SOLUSDT".to_string(), trending_bars(20.0, 0.002, 60));
    history
}

fn meta() -> Vec<SymbolInfo> {
    vec![SymbolInfo::new("BTC", "USDT"), SymbolInfo::new("ETH", "USDT")]
}

fn register_constant(registry: &mut FactorRegistry, id: &str, values: &[(&str, f64)]) {
    let column = format!("{}_factor", id);
    let info = FactorInfo::new(id, id, "test factor", &[column.as_str()]);
    let values: Vec<(String, f64)> = values.iter().map(|(s, v)| (s.to_string(), *v)).collect();
    registry.register_fn(info, move |_: &PriceHistory| {
        let mut output = FactorOutput::new();
        for (symbol, value) in &values {
            let mut row = FactorValues::new();
            row.insert(column.clone(), *value);
            output.insert(symbol.clone(), row);
        }
        Ok(output)
    });
}

#[test]
fn test_defaults_listed_in_registration_order() {
    let registry = FactorRegistry::with_defaults();
    let ids: Vec<String> = registry.list().into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["momentum", "support", "volatility", "volume"]);
    assert!(registry.list()[0].columns.contains(&"momentum_factor".to_string()));
}

#[test]
fn test_compute_all_ranks_and_sorts() {
    let registry = FactorRegistry::with_defaults();
    let composition = registry.compute_all(&history(), &meta());
    let table = composition.table;

    assert_eq!(table.len(), 3);
    assert!(composition.skipped_factors.is_empty());
    for column in ["momentum_score", "support_score", "low_volatility_score", "volume_trend_score", COMPOSITE_COLUMN] {
        assert!(table.columns.iter().any(|c| c == column), "missing {}", column);
    }

    let scores: Vec<f64> = table.rows.iter().map(|r| r.composite_score().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(scores.iter().all(|s| *s > 0.0 && *s <= 1.0));

    // strongest uptrend has the top momentum rank
    assert_eq!(table.row("BTCUSDT").unwrap().get("momentum_score"), Some(1.0));
    assert_eq!(table.row("ETHUSDT").unwrap().name, "ETH/USDT");
    // no metadata -> symbol doubles as the name
    assert_eq!(table.row("SOLUSDT").unwrap().name, "SOLUSDT");
}

#[test]
fn test_failing_symbol_keeps_row_with_nulls() {
    let mut registry = FactorRegistry::new();
    register_constant(&mut registry, "steady", &[("BTCUSDT", 1.0), ("ETHUSDT", 2.0)]);
    registry.register_fn(FactorInfo::new("flaky", "flaky", "fails for BTC", &["flaky_factor"]), |history: &PriceHistory| {
        Ok(per_symbol("flaky", history, |bars: &[Bar]| {
            if bars[0].close > 90.0 {
                return Err(FactorError::Calculation("boom".to_string()));
            }
            let mut values = FactorValues::new();
            values.insert("flaky_factor".to_string(), 0.5);
            Ok(values)
        }))
    });

    let mut history = PriceHistory::new();
    history.insert("BTCUSDT".to_string(), trending_bars(100.0, 0.0, 5));
    history.insert("ETHUSDT".to_string(), trending_bars(50.0, 0.0, 5));

    let table = registry.compute_all(&history, &[]).table;
    assert_eq!(table.len(), 2);

    let btc = table.row("BTCUSDT").unwrap();
    assert_eq!(btc.get("flaky_factor"), None);
    assert_eq!(btc.get("flaky_score"), None);
    assert!(btc.values.contains_key("flaky_factor"));
    assert_eq!(btc.get("steady_factor"), Some(1.0));
    assert_eq!(btc.composite_score(), Some(0.5));

    let eth = table.row("ETHUSDT").unwrap();
    assert_eq!(eth.get("flaky_score"), Some(1.0));
    assert_eq!(eth.composite_score(), Some(1.0));
    assert_eq!(table.symbols(), vec!["ETHUSDT", "BTCUSDT"]);
}

#[test]
fn test_factor_error_blanks_columns_only() {
    let mut registry = FactorRegistry::new();
    registry.register_fn(FactorInfo::new("broken", "broken", "always fails", &["broken_factor"]), |_: &PriceHistory| {
        Err(FactorError::Calculation("upstream shape changed".to_string()))
    });

    let composition = registry.compute_all(&history(), &meta());
    assert_eq!(composition.table.len(), 3);
    for row in &composition.table.rows {
        assert_eq!(row.get("broken_factor"), None);
        assert_eq!(row.composite_score(), None);
    }
    // all composites missing -> symbol order
    assert_eq!(composition.table.symbols(), vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
}

#[test]
fn test_compute_selected_reports_unknown_ids() {
    let registry = FactorRegistry::with_defaults();
    let ids = vec!["momentum".to_string(), "astrology".to_string(), "momentum".to_string()];
    let composition = registry.compute_selected(&history(), &meta(), &ids);

    assert_eq!(composition.skipped_factors, vec!["astrology".to_string()]);
    assert!(composition.table.columns.iter().any(|c| c == "momentum_score"));
    assert!(!composition.table.columns.iter().any(|c| c == "support_score"));
    assert_eq!(composition.table.len(), 3);
}

#[test]
fn test_all_unknown_keeps_every_symbol() {
    let registry = FactorRegistry::with_defaults();
    let composition = registry.compute_selected(&history(), &meta(), &["nope".to_string()]);
    assert_eq!(composition.table.len(), 3);
    assert_eq!(composition.table.columns, vec![COMPOSITE_COLUMN.to_string()]);

    let json = serde_json::to_value(&composition).unwrap();
    assert_eq!(json["skipped_factors"][0], "nope");
}

#[test]
fn test_ties_broken_by_symbol() {
    let mut registry = FactorRegistry::new();
    register_constant(&mut registry, "flat", &[("BBB", 1.0), ("AAA", 1.0), ("CCC", 2.0)]);

    let mut history = PriceHistory::new();
    for symbol in ["CCC", "BBB", "AAA"] {
        history.insert(symbol.to_string(), trending_bars(10.0, 0.0, 3));
    }
    let table = registry.compute_all(&history, &[]).table;
    assert_eq!(table.symbols(), vec!["CCC", "AAA", "BBB"]);
    assert_eq!(table.row("AAA").unwrap().get("flat_score"), Some(0.5));
}

#[test]
fn test_symbols_without_bars_are_excluded() {
    let mut history = history();
    history.insert("DOGEUSDT".to_string(), Vec::new());
    let table = FactorRegistry::with_defaults().compute_all(&history, &[]).table;
    assert!(table.row("DOGEUSDT").is_none());
    assert_eq!(table.len(), 3);
}

#[test]
fn test_register_replaces_same_id() {
    let mut registry = FactorRegistry::with_defaults();
    register_constant(&mut registry, "momentum", &[]);
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.list()[0].columns, vec!["momentum_factor".to_string()]);
}

#[test]
fn test_short_history_yields_missing_cells() {
    let mut history = history();
    history.insert("NEWUSDT".to_string(), trending_bars(1.0, 0.05, 3));
    let table = FactorRegistry::with_defaults().compute_all(&history, &[]).table;

    let new = table.row("NEWUSDT").unwrap();
    assert_eq!(new.get("momentum_factor"), None);
    assert_eq!(new.get("volume_trend_factor"), None);
    assert_eq!(table.rows.last().map(|r| r.symbol.as_str()), Some("NEWUSDT"));
}

#[test]
fn test_panicking_factor_keeps_rows_with_nulls() {
    let mut registry = FactorRegistry::with_defaults();
    registry.register_fn(
        FactorInfo::new("brittle", "brittle", "indexes past short series", &["brittle_factor"]),
        |history: &PriceHistory| {
            let mut output = FactorOutput::new();
            for (symbol, bars) in history {
                let mut values = FactorValues::new();
                values.insert("brittle_factor".to_string(), bars[59].close);
                output.insert(symbol.clone(), values);
            }
            Ok(output)
        },
    );

    let mut history = history();
    history.insert("DOGEUSDT".to_string(), trending_bars(0.1, 0.0, 10));

    let table = registry.compute_all(&history, &meta()).table;
    assert_eq!(table.len(), 4);
    for row in &table.rows {
        assert_eq!(row.get("brittle_factor"), None);
        assert_eq!(row.get("brittle_score"), None);
        assert!(row.values.contains_key("brittle_factor"));
        assert!(row.composite_score().is_some());
    }
    assert!(table.row("BTCUSDT").unwrap().get("momentum_factor").is_some());
}

#[test]
fn test_per_symbol_isolates_a_panic() {
    let output = per_symbol("brittle", &history(), |bars: &[Bar]| {
        if bars[0].close < 60.0 && bars[0].close > 40.0 {
            panic!("bad series");
        }
        let mut values = FactorValues::new();
        values.insert("brittle_factor".to_string(), bars[0].close);
        Ok(values)
    });

    assert!(output.contains_key("BTCUSDT"));
    assert!(output.contains_key("SOLUSDT"));
    assert!(!output.contains_key("ETHUSDT"));
}
