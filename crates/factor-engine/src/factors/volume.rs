use analysis_core::{stats, Bar, PriceHistory};

use crate::factor::{per_symbol, require};
use crate::{Factor, FactorError, FactorInfo, FactorOutput, FactorValues};

const SHORT_WINDOW: usize = 5;
const LONG_WINDOW: usize = 20;

/// Recent turnover relative to its 20-bar average
pub struct VolumeFactor {
    info: FactorInfo,
}

impl VolumeFactor {
    pub fn new() -> Self {
        Self {
            info: FactorInfo::new(
                "volume",
                "Volume trend",
                "Mean turnover of the last 5 bars over the mean of the last 20",
                &["volume_trend_factor", "avg_turnover_20d"],
            ),
        }
    }

    fn compute_bars(bars: &[Bar]) -> Result<FactorValues, FactorError> {
        require(bars, LONG_WINDOW)?;
        let turnover: Vec<f64> = bars.iter().map(|b| b.turnover).collect();
        let long = stats::mean(&turnover[turnover.len() - LONG_WINDOW..]);
        let short = stats::mean(&turnover[turnover.len() - SHORT_WINDOW..]);
        if long <= 0.0 {
            return Err(FactorError::Calculation("no turnover in window".to_string()));
        }

        let mut values = FactorValues::new();
        values.insert("volume_trend_factor".to_string(), short / long);
        values.insert("avg_turnover_20d".to_string(), long);
        Ok(values)
    }
}

impl Default for VolumeFactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Factor for VolumeFactor {
    fn info(&self) -> &FactorInfo {
        &self.info
    }

    fn compute(&self, history: &PriceHistory) -> Result<FactorOutput, FactorError> {
        Ok(per_symbol(&self.info.id, history, Self::compute_bars))
    }
}
