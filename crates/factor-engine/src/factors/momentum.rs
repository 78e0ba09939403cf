use analysis_core::{stats, Bar, PriceHistory};

use crate::factor::{closes, per_symbol, require};
use crate::{Factor, FactorError, FactorInfo, FactorOutput, FactorValues};

/// Lookback for the ranked momentum column
pub const MOMENTUM_LOOKBACK: usize = 20;
const SHORT_LOOKBACK: usize = 5;

/// Close-to-close return over the lookback window
pub struct MomentumFactor {
    info: FactorInfo,
}

impl MomentumFactor {
    pub fn new() -> Self {
        Self {
            info: FactorInfo::new(
                "momentum",
                "Momentum",
                "20-bar close-to-close return; higher momentum ranks higher",
                &["momentum_factor", "return_5d", "return_20d"],
            ),
        }
    }

    fn compute_bars(bars: &[Bar]) -> Result<FactorValues, FactorError> {
        require(bars, SHORT_LOOKBACK + 1)?;
        let prices = closes(bars);
        let last = prices[prices.len() - 1];

        let mut values = FactorValues::new();
        if let Some(r5) = stats::pct_change(prices[prices.len() - 1 - SHORT_LOOKBACK], last) {
            values.insert("return_5d".to_string(), r5);
        }
        if prices.len() > MOMENTUM_LOOKBACK {
            let base = prices[prices.len() - 1 - MOMENTUM_LOOKBACK];
            if let Some(r20) = stats::pct_change(base, last) {
                values.insert("return_20d".to_string(), r20);
                values.insert("momentum_factor".to_string(), r20 / 100.0);
            }
        }
        Ok(values)
    }
}

impl Default for MomentumFactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Factor for MomentumFactor {
    fn info(&self) -> &FactorInfo {
        &self.info
    }

    fn compute(&self, history: &PriceHistory) -> Result<FactorOutput, FactorError> {
        Ok(per_symbol(&self.info.id, history, Self::compute_bars))
    }
}
