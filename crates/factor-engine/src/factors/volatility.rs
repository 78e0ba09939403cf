use analysis_core::{stats, Bar, PriceHistory};

use crate::factor::{closes, per_symbol, require};
use crate::{Factor, FactorError, FactorInfo, FactorOutput, FactorValues};

const WINDOW: usize = 20;
const MIN_RETURNS: usize = 5;

/// Realised volatility of daily returns; calmer series rank higher
pub struct VolatilityFactor {
    info: FactorInfo,
}

impl VolatilityFactor {
    pub fn new() -> Self {
        Self {
            info: FactorInfo::new(
                "volatility",
                "Low volatility",
                "Negated standard deviation of the last 20 daily returns",
                &["low_volatility_factor", "volatility_20d"],
            ),
        }
    }

    fn compute_bars(bars: &[Bar]) -> Result<FactorValues, FactorError> {
        require(bars, MIN_RETURNS + 1)?;
        let window = &bars[bars.len().saturating_sub(WINDOW + 1)..];
        let rets = stats::returns(&closes(window));
        if rets.len() < MIN_RETURNS {
            return Err(FactorError::InsufficientData {
                required: MIN_RETURNS + 1,
                available: rets.len() + 1,
            });
        }

        let vol = stats::std_dev(&rets);
        let mut values = FactorValues::new();
        values.insert("low_volatility_factor".to_string(), -vol);
        values.insert("volatility_20d".to_string(), vol * 100.0);
        Ok(values)
    }
}

impl Default for VolatilityFactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Factor for VolatilityFactor {
    fn info(&self) -> &FactorInfo {
        &self.info
    }

    fn compute(&self, history: &PriceHistory) -> Result<FactorOutput, FactorError> {
        Ok(per_symbol(&self.info.id, history, Self::compute_bars))
    }
}
