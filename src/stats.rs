//! Sample statistics shared by the estimators
//!
//! All moments are population estimates (divide by `n`). Percentiles use
//! linear interpolation between the two closest ranks.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TailRiskError};

/// Arithmetic mean, zero for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile of `values` for `pct` in [0, 100]
///
/// Uses `rank = pct / 100 * (n - 1)` and interpolates between the neighbouring
/// order statistics.
pub fn percentile(values: &[f64], pct: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(TailRiskError::InsufficientData(
            "Cannot take a percentile of an empty sample".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&pct) {
        return Err(TailRiskError::InvalidParameter(format!(
            "Percentile {} outside [0, 100]",
            pct
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(percentile_sorted(&sorted, pct))
}

/// Percentile of an already sorted, non-empty slice
pub(crate) fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let w = rank - lo as f64;
        sorted[lo] + w * (sorted[hi] - sorted[lo])
    }
}

/// Median of a non-empty sample
pub fn median(values: &[f64]) -> Result<f64> {
    percentile(values, 50.0)
}

/// Mean, standard deviation, skewness and excess kurtosis
///
/// A sample with (numerically) zero variance reports zero skewness and zero
/// excess kurtosis.
pub fn moments(values: &[f64]) -> Moments {
    if values.is_empty() {
        return Moments::default();
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let mut m2 = 0.0;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &x in values {
        let d = x - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;

    if m2 <= 1e-20 {
        return Moments {
            mean,
            ..Moments::default()
        };
    }

    Moments {
        mean,
        std_dev: m2.sqrt(),
        skewness: m3 / m2.powf(1.5),
        excess_kurtosis: m4 / (m2 * m2) - 3.0,
    }
}

/// First four moments of a sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

/// Pearson correlation of two equally long series
///
/// Returns `None` when either series has zero variance or fewer than two
/// points.
pub fn correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }

    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mx;
        let dy = b - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }

    if vx <= 1e-20 || vy <= 1e-20 {
        return None;
    }

    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Simple return between two consecutive observations
pub(crate) fn simple_return(previous: f64, current: f64) -> Option<f64> {
    if previous > 0.0 && previous.is_finite() && current.is_finite() {
        Some((current - previous) / previous)
    } else {
        None
    }
}

/// Keep only the most recent `window` values
pub(crate) fn tail_window(values: &[f64], window: usize) -> &[f64] {
    if values.len() > window {
        &values[values.len() - window..]
    } else {
        values
    }
}
