use analysis_core::{stats, PriceHistory, SymbolInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::factors::{MomentumFactor, SupportFactor, VolatilityFactor, VolumeFactor};
use crate::factor::guarded;
use crate::table::{score_column_for, FactorRow, FactorTable, COMPOSITE_COLUMN};
use crate::{Factor, FactorError, FactorInfo, FactorOutput, FnFactor};

/// Ranked table plus the selected ids that did not resolve to a factor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub table: FactorTable,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_factors: Vec<String>,
}

/// Factors keyed by id, populated at startup and read-only afterwards
#[derive(Clone, Default)]
pub struct FactorRegistry {
    factors: Vec<Arc<dyn Factor>>,
}

impl FactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in factors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MomentumFactor::new()));
        registry.register(Arc::new(SupportFactor::new()));
        registry.register(Arc::new(VolatilityFactor::new()));
        registry.register(Arc::new(VolumeFactor::new()));
        registry
    }

    /// Register a factor. A factor with the same id is replaced in place.
    pub fn register(&mut self, factor: Arc<dyn Factor>) {
        let id = factor.info().id.clone();
        match self.factors.iter_mut().find(|f| f.info().id == id) {
            Some(slot) => {
                debug!("Replacing factor {}", id);
                *slot = factor;
            }
            None => self.factors.push(factor),
        }
    }

    pub fn register_fn<F>(&mut self, info: FactorInfo, func: F)
    where
        F: Fn(&PriceHistory) -> Result<FactorOutput, FactorError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnFactor::new(info, func)));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Factor>> {
        self.factors.iter().find(|f| f.info().id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Factor metadata in registration order
    pub fn list(&self) -> Vec<FactorInfo> {
        self.factors.iter().map(|f| f.info().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Run every registered factor.
    pub fn compute_all(&self, history: &PriceHistory, meta: &[SymbolInfo]) -> Composition {
        compose(&self.factors, history, meta, Vec::new())
    }

    /// Run only the factors named in `ids`, in the order given.
    ///
    /// Unknown ids are skipped and reported in [`Composition::skipped_factors`].
    pub fn compute_selected(&self, history: &PriceHistory, meta: &[SymbolInfo], ids: &[String]) -> Composition {
        let mut selected: Vec<Arc<dyn Factor>> = Vec::new();
        let mut skipped = Vec::new();

        for id in ids {
            match self.get(id) {
                Some(factor) => {
                    if !selected.iter().any(|f| f.info().id == *id) {
                        selected.push(factor);
                    }
                }
                None => {
                    warn!("Unknown factor id '{}', skipping", id);
                    if !skipped.contains(id) {
                        skipped.push(id.clone());
                    }
                }
            }
        }

        compose(&selected, history, meta, skipped)
    }
}

impl std::fmt::Debug for FactorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorRegistry")
            .field("factors", &self.factors.iter().map(|f| f.info().id.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

fn compose(
    factors: &[Arc<dyn Factor>],
    history: &PriceHistory,
    meta: &[SymbolInfo],
    skipped_factors: Vec<String>,
) -> Composition {
    let mut table = FactorTable::default();

    // Row set = symbols that have data; factors never add or remove rows
    for (symbol, bars) in history {
        if bars.is_empty() {
            continue;
        }
        let name = meta
            .iter()
            .find(|m| m.symbol == *symbol)
            .map(|m| m.name.as_str())
            .unwrap_or(symbol.as_str());
        table.rows.push(FactorRow::new(symbol, name));
    }

    for factor in factors {
        let info = factor.info();
        for column in &info.columns {
            table.push_column(column);
        }

        let output = match guarded(|| factor.compute(history)) {
            Ok(output) => output,
            Err(e) => {
                warn!("Factor {} failed for the whole batch: {}", info.id, e);
                continue;
            }
        };

        for row in &mut table.rows {
            if let Some(values) = output.get(&row.symbol) {
                for (column, value) in values {
                    row.set(column, Some(*value));
                }
            }
        }
        // Columns a factor returns without declaring them
        let mut extra: Vec<&String> = output
            .values()
            .flat_map(|values| values.keys())
            .filter(|c| !info.columns.iter().any(|d| d == *c))
            .collect();
        extra.sort();
        extra.dedup();
        for column in extra {
            table.push_column(column);
        }
    }

    let raw_columns: Vec<String> = table
        .columns
        .iter()
        .filter(|c| score_column_for(c).is_some())
        .cloned()
        .collect();

    let mut score_columns = Vec::with_capacity(raw_columns.len());
    for raw in &raw_columns {
        let Some(score_column) = score_column_for(raw) else {
            continue;
        };
        let raw_values: Vec<Option<f64>> = table.rows.iter().map(|r| r.get(raw)).collect();
        let ranks = stats::percentile_ranks(&raw_values);
        for (row, rank) in table.rows.iter_mut().zip(ranks) {
            row.set(&score_column, rank);
        }
        table.push_column(&score_column);
        score_columns.push(score_column);
    }

    for row in &mut table.rows {
        let present: Vec<f64> = score_columns.iter().filter_map(|c| row.get(c)).collect();
        let composite = if present.is_empty() { None } else { Some(stats::mean(&present)) };
        row.set(COMPOSITE_COLUMN, composite);
    }
    table.push_column(COMPOSITE_COLUMN);

    table.fill_missing();
    table.sort_by_composite();

    debug!(
        "Composed {} factors over {} symbols into {} columns",
        factors.len(),
        table.len(),
        table.columns.len()
    );

    Composition { table, skipped_factors }
}
