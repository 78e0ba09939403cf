use analysis_core::{Bar, PriceHistory};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::FactorError;

/// Column name -> value for a single symbol
pub type FactorValues = BTreeMap<String, f64>;

/// Symbol -> columns produced by one factor
pub type FactorOutput = BTreeMap<String, FactorValues>;

/// Factor metadata, exposed to clients building factor pickers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorInfo {
    /// Stable identifier used for selection
    pub id: String,
    pub name: String,
    pub description: String,
    /// Columns this factor produces
    pub columns: Vec<String>,
}

impl FactorInfo {
    pub fn new(id: &str, name: &str, description: &str, columns: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A named computation over price history
pub trait Factor: Send + Sync {
    fn info(&self) -> &FactorInfo;

    /// Columns per symbol. Symbols missing from the output get missing values
    /// for this factor's columns; an `Err` blanks the factor for every symbol.
    fn compute(&self, history: &PriceHistory) -> Result<FactorOutput, FactorError>;
}

/// Run `f` for every symbol, dropping symbols whose computation fails, panics or is empty.
pub fn per_symbol<F>(factor_id: &str, history: &PriceHistory, f: F) -> FactorOutput
where
    F: Fn(&[Bar]) -> Result<FactorValues, FactorError>,
{
    let mut output = FactorOutput::new();
    for (symbol, bars) in history {
        match guarded(|| f(bars)) {
            Ok(values) if !values.is_empty() => {
                output.insert(symbol.clone(), values);
            }
            Ok(_) => {
                tracing::debug!("Factor {} produced no values for {}", factor_id, symbol);
            }
            Err(e) => {
                tracing::warn!("Factor {} failed for {}: {}", factor_id, symbol, e);
            }
        }
    }
    output
}

/// Adapter turning a plain function into a [`Factor`]
pub struct FnFactor<F> {
    info: FactorInfo,
    func: F,
}

impl<F> FnFactor<F>
where
    F: Fn(&PriceHistory) -> Result<FactorOutput, FactorError> + Send + Sync,
{
    pub fn new(info: FactorInfo, func: F) -> Self {
        Self { info, func }
    }
}

impl<F> Factor for FnFactor<F>
where
    F: Fn(&PriceHistory) -> Result<FactorOutput, FactorError> + Send + Sync,
{
    fn info(&self) -> &FactorInfo {
        &self.info
    }

    fn compute(&self, history: &PriceHistory) -> Result<FactorOutput, FactorError> {
        (self.func)(history)
    }
}

/// Run a factor computation, turning a panic into [`FactorError::Calculation`].
pub(crate) fn guarded<T, F>(f: F) -> Result<T, FactorError>
where
    F: FnOnce() -> Result<T, FactorError>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(FactorError::Calculation(format!("panicked: {}", panic_message(payload.as_ref()))))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Closing prices of a bar series
pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub(crate) fn require(bars: &[Bar], required: usize) -> Result<(), FactorError> {
    if bars.len() < required {
        return Err(FactorError::InsufficientData {
            required,
            available: bars.len(),
        });
    }
    Ok(())
}
