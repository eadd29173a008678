//! Cross-asset correlation and diversification analysis
//!
//! Provides:
//! - Pairwise Pearson correlation matrix of asset returns
//! - Joint-tail correlation (both assets strictly below their own 5th percentile)
//! - Diversification ratio of the equal-weighted portfolio
//!
//! Return histories are aligned by truncating every series to the most recent
//! `min_len` observations, which assumes a common sampling frequency.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TailRiskError};
use crate::stats;

/// Lower-tail percentile defining a joint tail event
pub const TAIL_PERCENTILE: f64 = 5.0;

/// Minimum joint tail events for a tail correlation
pub const MIN_JOINT_TAIL_EVENTS: usize = 5;

/// Tail correlation of one symbol pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailCorrelation {
    pub first: String,
    pub second: String,
    pub joint_events: usize,
    /// `None` when fewer than five joint tail events exist or variance is zero
    pub correlation: Option<f64>,
}

/// Correlation and diversification report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    pub symbols: Vec<String>,
    /// Number of aligned observations per symbol
    pub observations: usize,
    /// Row-major correlation matrix in `symbols` order; `None` for pairs
    /// involving a zero-variance series
    pub correlation_matrix: Vec<Vec<Option<f64>>>,
    /// Summary over the defined off-diagonal pairs; `None` when there are none
    pub average_correlation: Option<f64>,
    pub max_correlation: Option<f64>,
    pub min_correlation: Option<f64>,
    pub most_correlated_pair: Option<(String, String)>,
    pub tail_correlations: Vec<TailCorrelation>,
    /// `None` when the equal-weighted portfolio has zero volatility
    pub diversification_ratio: Option<f64>,
    pub average_volatility: f64,
    pub portfolio_volatility: f64,
}

/// Correlation analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Minimum aligned observations per symbol
    pub min_observations: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            min_observations: 30,
        }
    }
}

/// Correlation and diversification analyzer
#[derive(Debug, Clone, Default)]
pub struct CorrelationAnalyzer {
    config: CorrelationConfig,
}

impl CorrelationAnalyzer {
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    /// Truncate every series to the shortest common (most recent) length
    pub fn align(returns: &BTreeMap<String, Vec<f64>>) -> (Vec<String>, DMatrix<f64>) {
        let symbols: Vec<String> = returns.keys().cloned().collect();
        let min_len = returns.values().map(Vec::len).min().unwrap_or(0);

        let mut matrix = DMatrix::zeros(min_len, symbols.len());
        for (j, symbol) in symbols.iter().enumerate() {
            let aligned = stats::tail_window(&returns[symbol], min_len);
            for (i, r) in aligned.iter().enumerate() {
                matrix[(i, j)] = *r;
            }
        }
        (symbols, matrix)
    }

    /// Pearson correlation matrix of the aligned columns
    ///
    /// Pairs involving a zero-variance column are undefined off the diagonal.
    pub fn correlation_matrix(aligned: &DMatrix<f64>) -> DMatrix<Option<f64>> {
        let n = aligned.ncols();
        let columns: Vec<Vec<f64>> = aligned.column_iter().map(|c| c.iter().copied().collect()).collect();

        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                Some(1.0)
            } else {
                stats::correlation(&columns[i], &columns[j])
            }
        })
    }

    /// Correlation restricted to joint lower-tail events
    pub fn tail_correlation(x: &[f64], y: &[f64]) -> Result<(usize, Option<f64>)> {
        let qx = stats::percentile(x, TAIL_PERCENTILE)?;
        let qy = stats::percentile(y, TAIL_PERCENTILE)?;

        let (tx, ty): (Vec<f64>, Vec<f64>) = x
            .iter()
            .zip(y)
            .filter(|(a, b)| **a < qx && **b < qy)
            .map(|(a, b)| (*a, *b))
            .unzip();

        let joint = tx.len();
        if joint < MIN_JOINT_TAIL_EVENTS {
            return Ok((joint, None));
        }
        Ok((joint, stats::correlation(&tx, &ty)))
    }

    /// Equal-weighted diversification ratio
    ///
    /// Returns `(ratio, average individual volatility, portfolio volatility)`.
    pub fn diversification_ratio(aligned: &DMatrix<f64>) -> (Option<f64>, f64, f64) {
        let vols: Vec<f64> = aligned
            .column_iter()
            .map(|c| stats::std_dev(&c.iter().copied().collect::<Vec<_>>()))
            .collect();
        let average_volatility = stats::mean(&vols);

        let k = aligned.ncols().max(1) as f64;
        let weights = DVector::from_element(aligned.ncols(), 1.0 / k);
        let portfolio_returns = aligned * weights;
        let portfolio_volatility = stats::std_dev(portfolio_returns.as_slice());

        let ratio = (portfolio_volatility > 1e-15)
            .then(|| average_volatility / portfolio_volatility)
            .filter(|r| r.is_finite());
        (ratio, average_volatility, portfolio_volatility)
    }

    /// Full analysis over the symbols with enough history
    pub fn analyze(&self, returns: &BTreeMap<String, Vec<f64>>) -> Result<CorrelationAnalysis> {
        let eligible: BTreeMap<String, Vec<f64>> = returns
            .iter()
            .filter(|(_, r)| r.len() >= self.config.min_observations)
            .map(|(s, r)| (s.clone(), r.clone()))
            .collect();

        if eligible.len() < 2 {
            return Err(TailRiskError::InsufficientData(format!(
                "Need at least 2 symbols with {} returns, got {}",
                self.config.min_observations,
                eligible.len()
            )));
        }

        let (symbols, aligned) = Self::align(&eligible);
        let corr = Self::correlation_matrix(&aligned);
        let n = symbols.len();

        let mut off_diagonal = Vec::with_capacity(n * (n - 1) / 2);
        let mut most_correlated: Option<(usize, usize, f64)> = None;
        let mut tail_correlations = Vec::new();

        for i in 0..n {
            for j in (i + 1)..n {
                if let Some(c) = corr[(i, j)] {
                    if most_correlated.map_or(true, |(_, _, best)| c > best) {
                        most_correlated = Some((i, j, c));
                    }
                    off_diagonal.push(c);
                }

                let x: Vec<f64> = aligned.column(i).iter().copied().collect();
                let y: Vec<f64> = aligned.column(j).iter().copied().collect();
                let (joint_events, correlation) = Self::tail_correlation(&x, &y)?;
                tail_correlations.push(TailCorrelation {
                    first: symbols[i].clone(),
                    second: symbols[j].clone(),
                    joint_events,
                    correlation,
                });
            }
        }

        let (diversification_ratio, average_volatility, portfolio_volatility) =
            Self::diversification_ratio(&aligned);

        Ok(CorrelationAnalysis {
            observations: aligned.nrows(),
            correlation_matrix: (0..n)
                .map(|i| (0..n).map(|j| corr[(i, j)]).collect())
                .collect(),
            average_correlation: (!off_diagonal.is_empty()).then(|| stats::mean(&off_diagonal)),
            max_correlation: off_diagonal.iter().copied().reduce(f64::max),
            min_correlation: off_diagonal.iter().copied().reduce(f64::min),
            most_correlated_pair: most_correlated
                .map(|(i, j, _)| (symbols[i].clone(), symbols[j].clone())),
            tail_correlations,
            diversification_ratio,
            average_volatility,
            portfolio_volatility,
            symbols,
        })
    }
}
