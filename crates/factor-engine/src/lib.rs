//! Pluggable factor computation.
//!
//! A [`Factor`] turns per-symbol price history into named numeric columns.
//! The [`FactorRegistry`] runs every registered (or a selected subset of)
//! factors, joins their columns on symbol, derives a percentile-rank
//! `_score` column for every raw `_factor` column and orders the table by the
//! mean of those scores.

pub mod error;
pub mod factor;
pub mod factors;
pub mod registry;
pub mod table;

#[cfg(test)]
mod tests;

pub use error::FactorError;
pub use factor::{per_symbol, Factor, FactorInfo, FactorOutput, FactorValues, FnFactor};
pub use registry::{Composition, FactorRegistry};
pub use table::{score_column_for, FactorRow, FactorTable, COMPOSITE_COLUMN, RAW_FACTOR_SUFFIX, SCORE_SUFFIX};
