//! Drawdown analysis
//!
//! Drawdown `D_t = (X_t - M_t) / M_t` against the running peak `M_t`. A
//! drawdown period is a maximal run of observations with `D_t` below the
//! period threshold (-1% by default).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TailRiskError};
use crate::stats;

/// Drawdown below which an observation counts as underwater
pub const DEFAULT_PERIOD_THRESHOLD: f64 = -0.01;

/// Default recovery estimate when no period has completed yet
pub const DEFAULT_RECOVERY_PERIODS: f64 = 30.0;

/// Drawdown depths tracked in the portfolio breach probabilities
pub const BREACH_LEVELS: [f64; 3] = [0.05, 0.10, 0.20];

/// A contiguous run of observations below the period threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawdownPeriod {
    pub start_index: usize,
    /// Last index inside the run (inclusive)
    pub end_index: usize,
    pub duration: usize,
}

/// Period segmentation summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPeriodStats {
    pub count: usize,
    pub average_duration: f64,
    pub max_duration: usize,
    /// Length of the open period at the end of the series (0 when recovered)
    pub current_duration: usize,
    pub periods: Vec<DrawdownPeriod>,
}

/// Probability that drawdown has gone beyond a given depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownBreach {
    /// Depth as a positive fraction (0.10 = 10% below peak)
    pub level: f64,
    /// Fraction of observations with `D_t < -level`
    pub probability: f64,
}

/// Full drawdown report for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub current_drawdown: f64,
    pub max_drawdown: f64,
    /// Mean of the strictly negative drawdowns (0 when there are none)
    pub average_drawdown: f64,
    pub drawdown_volatility: f64,
    /// Percentage of observations below the period threshold
    pub time_underwater_pct: f64,
    pub periods: DrawdownPeriodStats,
    /// Median duration of completed periods, or the configured default
    pub estimated_recovery_periods: f64,
    pub recovery_is_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breach_probabilities: Vec<DrawdownBreach>,
}

/// Drawdown analyzer
#[derive(Debug, Clone)]
pub struct DrawdownEngine {
    period_threshold: f64,
    default_recovery_periods: f64,
}

impl Default for DrawdownEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_THRESHOLD, DEFAULT_RECOVERY_PERIODS)
    }
}

impl DrawdownEngine {
    pub fn new(period_threshold: f64, default_recovery_periods: f64) -> Self {
        Self {
            period_threshold,
            default_recovery_periods,
        }
    }

    /// Drawdown series of positive values
    pub fn drawdown_series(values: &[f64]) -> Result<Vec<f64>> {
        if values.is_empty() {
            return Err(TailRiskError::InsufficientData(
                "Drawdown needs at least one value".to_string(),
            ));
        }
        if values.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(TailRiskError::InvalidParameter(
                "Drawdown series must be positive and finite".to_string(),
            ));
        }

        let mut peak = f64::MIN;
        Ok(values
            .iter()
            .map(|&v| {
                peak = peak.max(v);
                ((v - peak) / peak).clamp(-1.0, 0.0)
            })
            .collect())
    }

    /// Split the series into maximal runs below the period threshold
    pub fn segment_periods(&self, drawdowns: &[f64]) -> Vec<DrawdownPeriod> {
        let mut periods = Vec::new();
        let mut start: Option<usize> = None;

        for (i, &d) in drawdowns.iter().enumerate() {
            match (d < self.period_threshold, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    periods.push(DrawdownPeriod {
                        start_index: s,
                        end_index: i - 1,
                        duration: i - s,
                    });
                    start = None;
                }
                _ => {}
            }
        }

        if let Some(s) = start {
            let end = drawdowns.len() - 1;
            periods.push(DrawdownPeriod {
                start_index: s,
                end_index: end,
                duration: end - s + 1,
            });
        }

        periods
    }

    /// Median duration of periods that ended before the last index
    pub fn estimate_recovery(&self, periods: &[DrawdownPeriod], len: usize) -> (f64, bool) {
        let completed: Vec<f64> = periods
            .iter()
            .filter(|p| p.end_index + 1 < len)
            .map(|p| p.duration as f64)
            .collect();

        match stats::median(&completed) {
            Ok(median) => (median, false),
            Err(_) => (self.default_recovery_periods, true),
        }
    }

    /// Analyze a price or portfolio-value series
    pub fn analyze(&self, values: &[f64]) -> Result<DrawdownAnalysis> {
        let drawdowns = Self::drawdown_series(values)?;
        let n = drawdowns.len();

        let current_drawdown = drawdowns[n - 1];
        let max_drawdown = drawdowns.iter().copied().fold(0.0_f64, f64::min);

        let negatives: Vec<f64> = drawdowns.iter().copied().filter(|d| *d < 0.0).collect();
        let average_drawdown = stats::mean(&negatives);

        let underwater = drawdowns
            .iter()
            .filter(|d| **d < self.period_threshold)
            .count();

        let periods = self.segment_periods(&drawdowns);
        let current_duration = periods
            .last()
            .filter(|p| p.end_index == n - 1)
            .map(|p| p.duration)
            .unwrap_or(0);
        let (estimated_recovery_periods, recovery_is_default) = self.estimate_recovery(&periods, n);

        let durations: Vec<f64> = periods.iter().map(|p| p.duration as f64).collect();

        Ok(DrawdownAnalysis {
            current_drawdown,
            max_drawdown,
            average_drawdown,
            drawdown_volatility: stats::std_dev(&drawdowns),
            time_underwater_pct: 100.0 * underwater as f64 / n as f64,
            periods: DrawdownPeriodStats {
                count: periods.len(),
                average_duration: stats::mean(&durations),
                max_duration: periods.iter().map(|p| p.duration).max().unwrap_or(0),
                current_duration,
                periods,
            },
            estimated_recovery_periods,
            recovery_is_default,
            breach_probabilities: Vec::new(),
        })
    }

    /// Analyze a portfolio-value series, adding breach probabilities
    pub fn analyze_portfolio(&self, values: &[f64]) -> Result<DrawdownAnalysis> {
        let mut analysis = self.analyze(values)?;
        let drawdowns = Self::drawdown_series(values)?;
        let n = drawdowns.len() as f64;

        analysis.breach_probabilities = BREACH_LEVELS
            .iter()
            .map(|&level| DrawdownBreach {
                level,
                probability: drawdowns.iter().filter(|d| **d < -level).count() as f64 / n,
            })
            .collect();

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_drawdown_series() {
        let values = vec![100.0, 110.0, 99.0, 121.0, 108.9];
        let dd = DrawdownEngine::drawdown_series(&values).unwrap();

        assert_eq!(dd[0], 0.0);
        assert_eq!(dd[1], 0.0);
        assert_relative_eq!(dd[2], -0.1, epsilon = 1e-12);
        assert_eq!(dd[3], 0.0);
        assert_relative_eq!(dd[4], -0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(DrawdownEngine::drawdown_series(&[]).is_err());
        assert!(DrawdownEngine::drawdown_series(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_constant_series_has_no_drawdown() {
        let analysis = DrawdownEngine::default().analyze(&[50.0; 40]).unwrap();

        assert_eq!(analysis.max_drawdown, 0.0);
        assert_eq!(analysis.current_drawdown, 0.0);
        assert_eq!(analysis.average_drawdown, 0.0);
        assert_eq!(analysis.drawdown_volatility, 0.0);
        assert_eq!(analysis.time_underwater_pct, 0.0);
        assert_eq!(analysis.periods.count, 0);
        assert!(analysis.recovery_is_default);
        assert_eq!(analysis.estimated_recovery_periods, DEFAULT_RECOVERY_PERIODS);
    }

    #[test]
    fn test_period_segmentation() {
        let engine = DrawdownEngine::default();
        let dd = vec![0.0, -0.02, -0.03, 0.0, -0.005, -0.05, -0.04, -0.02, 0.0, -0.02];
        let periods = engine.segment_periods(&dd);

        assert_eq!(
            periods,
            vec![
                DrawdownPeriod { start_index: 1, end_index: 2, duration: 2 },
                DrawdownPeriod { start_index: 5, end_index: 7, duration: 3 },
                DrawdownPeriod { start_index: 9, end_index: 9, duration: 1 },
            ]
        );

        // Last period is still open; median of completed [2, 3]
        let (recovery, is_default) = engine.estimate_recovery(&periods, dd.len());
        assert_eq!(recovery, 2.5);
        assert!(!is_default);
    }

    #[test]
    fn test_period_starting_at_zero() {
        let engine = DrawdownEngine::default();
        let periods = engine.segment_periods(&[-0.02, -0.02, 0.0]);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start_index, 0);
        assert_eq!(periods[0].duration, 2);
    }

    #[test]
    fn test_analyze_open_drawdown() {
        let values = vec![100.0, 105.0, 95.0, 100.0, 106.0, 104.0, 90.0, 88.0];
        let analysis = DrawdownEngine::default().analyze(&values).unwrap();

        assert_relative_eq!(analysis.max_drawdown, 88.0 / 106.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(analysis.current_drawdown, 88.0 / 106.0 - 1.0, epsilon = 1e-12);
        assert_eq!(analysis.periods.count, 2);
        assert_eq!(analysis.periods.current_duration, 3);
        assert_eq!(analysis.periods.max_duration, 3);
        assert_eq!(analysis.estimated_recovery_periods, 2.0);
        assert_relative_eq!(analysis.time_underwater_pct, 62.5);
    }

    #[test]
    fn test_portfolio_breach_probabilities() {
        let values = vec![100.0, 94.0, 89.0, 79.0, 100.0];
        let analysis = DrawdownEngine::default().analyze_portfolio(&values).unwrap();

        let probs: Vec<f64> = analysis.breach_probabilities.iter().map(|b| b.probability).collect();
        assert_eq!(probs, vec![0.6, 0.4, 0.2]);
    }
}
