//! Extreme value theory and descriptive tail metrics
//!
//! Peaks-over-threshold: losses (`-returns`) above the 90th loss percentile
//! are fitted with a Generalized Pareto Distribution and extrapolated to an
//! extreme quantile. The descriptive metrics compare the worst 5% / 1% of
//! returns with the central 25th-75th percentile mass.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TailRiskError};
use crate::fit::{self, GPD_SHAPE_EPSILON};
use crate::stats;

/// Confidence level of the extrapolated extreme quantile
pub const EXTREME_QUANTILE_LEVEL: f64 = 0.999;

/// Threshold exceedances of a loss sample
#[derive(Debug, Clone, PartialEq)]
pub struct PeaksOverThreshold {
    /// Loss threshold (percentile of `-returns`)
    pub threshold: f64,
    /// Losses strictly above the threshold, minus the threshold
    pub exceedances: Vec<f64>,
    /// Size of the full sample
    pub sample_size: usize,
}

impl PeaksOverThreshold {
    pub fn from_returns(returns: &[f64], threshold_percentile: f64) -> Result<Self> {
        let losses: Vec<f64> = returns.iter().map(|r| -r).collect();
        let threshold = stats::percentile(&losses, threshold_percentile)?;
        let exceedances = losses
            .iter()
            .filter(|&&l| l > threshold)
            .map(|l| l - threshold)
            .collect();

        Ok(Self {
            threshold,
            exceedances,
            sample_size: returns.len(),
        })
    }
}

/// Outcome tag for analyses that may not have enough data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Ok,
    InsufficientData,
    CalculationFailed,
}

/// GPD tail model of a return sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvtAnalysis {
    pub status: AnalysisStatus,
    pub threshold: f64,
    pub exceedances: usize,
    pub sample_size: usize,
    pub shape: Option<f64>,
    pub scale: Option<f64>,
    /// `1/ξ`; `None` together with `infinite_tail_index` when ξ = 0
    pub tail_index: Option<f64>,
    pub infinite_tail_index: bool,
    /// Extrapolated 99.9% loss quantile
    pub extreme_quantile: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Non-parametric tail-heaviness indicators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailMetrics {
    /// Mean of returns at or below the 5th percentile
    pub worst_5pct_mean: f64,
    /// Mean of returns at or below the 1st percentile
    pub worst_1pct_mean: f64,
    /// Mean of returns between the 25th and 75th percentiles
    pub central_mean: f64,
    /// |worst 5% mean| / |central mean|; `None` when the central mean is ~0
    pub tail_ratio_5pct: Option<f64>,
    /// |worst 1% mean| / |central mean|; `None` when the central mean is ~0
    pub tail_ratio_1pct: Option<f64>,
}

/// EVT and tail metric analyzer
#[derive(Debug, Clone)]
pub struct TailAnalyzer {
    threshold_percentile: f64,
    min_exceedances: usize,
}

impl Default for TailAnalyzer {
    fn default() -> Self {
        Self::new(90.0, 10)
    }
}

impl TailAnalyzer {
    pub fn new(threshold_percentile: f64, min_exceedances: usize) -> Self {
        Self {
            threshold_percentile,
            min_exceedances,
        }
    }

    /// Fit the GPD tail and extrapolate the 99.9% loss quantile
    ///
    /// Never fails: short samples report `insufficient_data`, fit errors
    /// report `calculation_failed`.
    pub fn analyze_evt(&self, returns: &[f64]) -> EvtAnalysis {
        let pot = match PeaksOverThreshold::from_returns(returns, self.threshold_percentile) {
            Ok(pot) => pot,
            Err(e) => {
                return EvtAnalysis::unavailable(
                    AnalysisStatus::InsufficientData,
                    0.0,
                    0,
                    returns.len(),
                    e.to_string(),
                )
            }
        };

        let count = pot.exceedances.len();
        if count < self.min_exceedances {
            return EvtAnalysis::unavailable(
                AnalysisStatus::InsufficientData,
                pot.threshold,
                count,
                pot.sample_size,
                format!("Need at least {} exceedances, got {}", self.min_exceedances, count),
            );
        }

        let gpd = match fit::fit_gpd(&pot.exceedances) {
            Ok(gpd) => gpd,
            Err(e) => {
                tracing::warn!(error = %e, "GPD fit failed");
                return EvtAnalysis::unavailable(
                    AnalysisStatus::CalculationFailed,
                    pot.threshold,
                    count,
                    pot.sample_size,
                    e.to_string(),
                );
            }
        };

        let infinite_tail_index = gpd.shape.abs() < GPD_SHAPE_EPSILON;
        let quantile =
            gpd.tail_quantile(pot.threshold, pot.sample_size, count, EXTREME_QUANTILE_LEVEL);

        EvtAnalysis {
            status: AnalysisStatus::Ok,
            threshold: pot.threshold,
            exceedances: count,
            sample_size: pot.sample_size,
            shape: Some(gpd.shape),
            scale: Some(gpd.scale),
            tail_index: (!infinite_tail_index).then(|| 1.0 / gpd.shape),
            infinite_tail_index,
            extreme_quantile: quantile.is_finite().then_some(quantile),
            message: None,
        }
    }

    /// Worst-tail means and their ratio to the central mass
    pub fn tail_metrics(&self, returns: &[f64]) -> Result<TailMetrics> {
        if returns.is_empty() {
            return Err(TailRiskError::InsufficientData(
                "Tail metrics need at least one return".to_string(),
            ));
        }

        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let p1 = stats::percentile_sorted(&sorted, 1.0);
        let p5 = stats::percentile_sorted(&sorted, 5.0);
        let p25 = stats::percentile_sorted(&sorted, 25.0);
        let p75 = stats::percentile_sorted(&sorted, 75.0);

        // Each subset holds at least the minimum (or the interquartile values)
        let below = |cut: f64| -> Vec<f64> { sorted.iter().copied().filter(|r| *r <= cut).collect() };
        let worst_5pct_mean = stats::mean(&below(p5));
        let worst_1pct_mean = stats::mean(&below(p1));
        let central: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|r| *r >= p25 && *r <= p75)
            .collect();
        let central_mean = stats::mean(&central);

        let ratio = |tail: f64| -> Option<f64> {
            (central_mean.abs() > 1e-12)
                .then(|| tail.abs() / central_mean.abs())
                .filter(|r| r.is_finite())
        };

        Ok(TailMetrics {
            worst_5pct_mean,
            worst_1pct_mean,
            central_mean,
            tail_ratio_5pct: ratio(worst_5pct_mean),
            tail_ratio_1pct: ratio(worst_1pct_mean),
        })
    }
}

impl EvtAnalysis {
    fn unavailable(
        status: AnalysisStatus,
        threshold: f64,
        exceedances: usize,
        sample_size: usize,
        message: String,
    ) -> Self {
        Self {
            status,
            threshold,
            exceedances,
            sample_size,
            shape: None,
            scale: None,
            tail_index: None,
            infinite_tail_index: false,
            extreme_quantile: None,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn heavy_tailed_returns(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let u = ((i * 61 % 199) as f64 + 0.5) / 199.0;
                // Pareto-like left tail, small right drift
                if u < 0.2 {
                    -0.005 * (0.2 / u).powf(0.6)
                } else {
                    0.004 * u
                }
            })
            .collect()
    }

    #[test]
    fn test_peaks_over_threshold() {
        let returns: Vec<f64> = (0..100).map(|i| -(i as f64) * 0.001).collect();
        let pot = PeaksOverThreshold::from_returns(&returns, 90.0).unwrap();

        assert_relative_eq!(pot.threshold, 0.0891, epsilon = 1e-12);
        assert_eq!(pot.exceedances.len(), 10);
        assert!(pot.exceedances.iter().all(|e| *e > 0.0));
        assert_eq!(pot.sample_size, 100);
    }

    #[test]
    fn test_evt_insufficient_data() {
        let returns: Vec<f64> = (0..50).map(|i| (i as f64 - 25.0) * 0.001).collect();
        let analysis = TailAnalyzer::default().analyze_evt(&returns);

        assert_eq!(analysis.status, AnalysisStatus::InsufficientData);
        assert_eq!(analysis.exceedances, 5);
        assert!(analysis.extreme_quantile.is_none());
    }

    #[test]
    fn test_evt_on_heavy_tail() {
        let returns = heavy_tailed_returns(600);
        let analysis = TailAnalyzer::default().analyze_evt(&returns);

        assert_eq!(analysis.status, AnalysisStatus::Ok);
        assert!(analysis.exceedances >= 10);
        let quantile = analysis.extreme_quantile.unwrap();
        assert!(quantile > analysis.threshold);
        assert!(analysis.shape.is_some());
        assert!(analysis.tail_index.is_some() || analysis.infinite_tail_index);
    }

    #[test]
    fn test_tail_metrics() {
        let returns = heavy_tailed_returns(400);
        let metrics = TailAnalyzer::default().tail_metrics(&returns).unwrap();

        assert!(metrics.worst_1pct_mean <= metrics.worst_5pct_mean);
        assert!(metrics.worst_5pct_mean < metrics.central_mean);
        let ratio = metrics.tail_ratio_5pct.unwrap();
        assert!(ratio > 1.0);
    }

    #[test]
    fn test_tail_ratio_undefined_for_zero_centre() {
        let returns = vec![0.0; 40];
        let metrics = TailAnalyzer::default().tail_metrics(&returns).unwrap();
        assert_eq!(metrics.central_mean, 0.0);
        assert!(metrics.tail_ratio_5pct.is_none());
        assert!(metrics.tail_ratio_1pct.is_none());
    }

    #[test]
    fn test_evt_serializes_without_nan() {
        let analysis = TailAnalyzer::default().analyze_evt(&[0.01; 40]);
        let json = serde_json::to_string(&analysis).unwrap();
        assert!(!json.contains("NaN"));
        assert!(json.contains("insufficient_data"));
    }
}
