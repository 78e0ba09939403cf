//! Small statistics helpers shared by the factor modules and the ranking step.
//!
//! Empty input yields a neutral value instead of NaN.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Compute sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Simple returns between consecutive values.
pub fn returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Percent change from `from` to `to`, or None when `from` is zero.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        return None;
    }
    finite((to - from) / from * 100.0)
}

/// Map NaN/inf to None.
pub fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Percentile rank of every present value, ascending, in (0, 1].
///
/// Ties receive the average of the ranks they span; the rank is divided by the
/// number of present values. Missing and non-finite inputs stay missing.
pub fn percentile_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.and_then(finite).map(|x| (i, x)))
        .collect();

    let mut ranks = vec![None; values.len()];
    if present.is_empty() {
        return ranks;
    }

    present.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let n = present.len() as f64;

    let mut start = 0;
    while start < present.len() {
        let mut end = start;
        while end + 1 < present.len() && present[end + 1].1 == present[start].1 {
            end += 1;
        }
        // 1-based ranks start+1 ..= end+1
        let avg_rank = (start + end) as f64 / 2.0 + 1.0;
        for &(idx, _) in &present[start..=end] {
            ranks[idx] = Some(avg_rank / n);
        }
        start = end + 1;
    }

    ranks
}
