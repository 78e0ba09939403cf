use analysis_core::{Bar, PriceHistory};

use crate::factor::{per_symbol, require};
use crate::{Factor, FactorError, FactorInfo, FactorOutput, FactorValues};

const WINDOW: usize = 30;
const MIN_BARS: usize = 5;

/// Position of the latest close inside the recent high/low range.
///
/// `support_factor` is 1.0 when price sits on the range low (support) and 0.0
/// at the range high (resistance).
pub struct SupportFactor {
    info: FactorInfo,
}

impl SupportFactor {
    pub fn new() -> Self {
        Self {
            info: FactorInfo::new(
                "support",
                "Support proximity",
                "Closeness of the last close to the 30-bar low; closer to support ranks higher",
                &["support_factor", "support_level", "resistance_level"],
            ),
        }
    }

    fn compute_bars(bars: &[Bar]) -> Result<FactorValues, FactorError> {
        require(bars, MIN_BARS)?;
        let window = &bars[bars.len().saturating_sub(WINDOW)..];

        let support = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let resistance = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let range = resistance - support;
        if !range.is_finite() || range <= 0.0 {
            return Err(FactorError::Calculation("flat high/low range".to_string()));
        }

        let close = window[window.len() - 1].close;
        let mut values = FactorValues::new();
        values.insert("support_factor".to_string(), ((resistance - close) / range).clamp(0.0, 1.0));
        values.insert("support_level".to_string(), support);
        values.insert("resistance_level".to_string(), resistance);
        Ok(values)
    }
}

impl Default for SupportFactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Factor for SupportFactor {
    fn info(&self) -> &FactorInfo {
        &self.info
    }

    fn compute(&self, history: &PriceHistory) -> Result<FactorOutput, FactorError> {
        Ok(per_symbol(&self.info.id, history, Self::compute_bars))
    }
}
