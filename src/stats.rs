//! Weighted residual statistics and robust outlier rejection
use itertools::Itertools;
use log::debug;

use crate::{errors::StatsError, toa::ResidualSet};

/// Scaling from the median absolute deviation to the standard deviation
/// of a normal distribution.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Returns (Σw.r, Σw.r², Σw) with w = 1/σ²
fn weighted_sums(set: &ResidualSet) -> Result<(f64, f64, f64), StatsError> {
    if set.is_empty() {
        return Err(StatsError::EmptyInput);
    }

    let (mut num, mut num_sq, mut den) = (0.0_f64, 0.0_f64, 0.0_f64);
    for toa in set {
        let weight = 1.0 / (toa.error as f64).powi(2);
        let residual = toa.residual as f64;
        num += weight * residual;
        num_sq += weight * residual.powi(2);
        den += weight;
    }

    Ok((num, num_sq, den))
}

/// Weighted mean of the residuals (s), weights being 1/σ².
pub fn weighted_mean(set: &ResidualSet) -> Result<f64, StatsError> {
    let (num, _, den) = weighted_sums(set)?;
    Ok(num / den)
}

/// Weighted root mean square of the residuals (s), weights being 1/σ².
/// Residuals are taken with respect to zero, not to their mean.
pub fn weighted_rms(set: &ResidualSet) -> Result<f64, StatsError> {
    let (_, num_sq, den) = weighted_sums(set)?;
    Ok((num_sq / den).sqrt())
}

/// Median, averaging the two central values of even sized inputs.
fn median(values: &[f64]) -> Option<f64> {
    let sorted = values
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect::<Vec<_>>();

    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Robust outlier rejection. Sigma is estimated from the median of the
/// absolute residuals, and only records verifying |res| <= factor.σ are kept,
/// in their original order. Residuals are assumed centred on zero.
pub fn clean_outliers(set: &ResidualSet, factor: f64) -> ResidualSet {
    let absolute = set
        .iter()
        .map(|toa| (toa.residual as f64).abs())
        .collect::<Vec<_>>();

    let mad = match median(&absolute) {
        Some(mad) => mad,
        None => return set.clone(),
    };

    let threshold = factor * MAD_TO_SIGMA * mad;
    let cleaned = set.filter(|toa| (toa.residual as f64).abs() <= threshold);

    debug!(
        "outlier rejection (threshold={:.3e}s): {}/{} kept",
        threshold,
        cleaned.len(),
        set.len()
    );

    cleaned
}

/// Subtracts the weighted mean from every residual, returns that mean.
pub fn recenter(set: &mut ResidualSet) -> Result<f64, StatsError> {
    let mean = weighted_mean(set)?;
    for toa in set.toas_mut() {
        toa.residual -= mean as f32;
    }
    Ok(mean)
}
