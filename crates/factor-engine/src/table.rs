use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix marking a raw factor column that gets ranked
pub const RAW_FACTOR_SUFFIX: &str = "_factor";
/// Suffix of the percentile-rank column derived from a raw factor column
pub const SCORE_SUFFIX: &str = "_score";
/// Mean of every derived rank column
pub const COMPOSITE_COLUMN: &str = "composite_score";

/// Rank column for a raw factor column, or None if `column` is not a raw factor.
pub fn score_column_for(column: &str) -> Option<String> {
    column
        .strip_suffix(RAW_FACTOR_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{}{}", stem, SCORE_SUFFIX))
}

/// One symbol's row; missing cells serialize as `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
    pub symbol: String,
    pub name: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl FactorRow {
    pub fn new(symbol: &str, name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    /// Store a value, turning NaN/inf into a missing cell.
    pub fn set(&mut self, column: &str, value: Option<f64>) {
        self.values
            .insert(column.to_string(), value.and_then(analysis_core::stats::finite));
    }

    pub fn composite_score(&self) -> Option<f64> {
        self.get(COMPOSITE_COLUMN)
    }
}

/// Wide table of factor columns keyed by symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorTable {
    /// Column order: factor columns as produced, then rank columns, then the composite
    pub columns: Vec<String>,
    pub rows: Vec<FactorRow>,
}

impl FactorTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, symbol: &str) -> Option<&FactorRow> {
        self.rows.iter().find(|r| r.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.symbol.as_str()).collect()
    }

    /// Add (or overwrite) a column; rows absent from `values` get a missing cell.
    pub fn insert_column(&mut self, column: &str, values: &BTreeMap<String, f64>) {
        self.push_column(column);
        for row in &mut self.rows {
            let value = values.get(&row.symbol).copied();
            row.set(column, value);
        }
    }

    pub(crate) fn push_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    /// Give every row a cell for every column.
    pub(crate) fn fill_missing(&mut self) {
        for row in &mut self.rows {
            for column in &self.columns {
                row.values.entry(column.clone()).or_insert(None);
            }
        }
    }

    /// Composite score descending, missing scores last, ties by symbol.
    pub(crate) fn sort_by_composite(&mut self) {
        self.rows.sort_by(|a, b| {
            let ord = match (a.composite_score(), b.composite_score()) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            ord.then_with(|| a.symbol.cmp(&b.symbol))
        });
    }
}
