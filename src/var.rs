//! Value at Risk (VaR) estimators
//!
//! Implements six VaR methodologies over a sample of simple returns. Every
//! estimate is a loss fraction: a positive number is the magnitude of the
//! loss not exceeded with probability `c`.
//!
//! - Historical: `-percentile(returns, (1-c)·100)`
//! - Parametric normal: `-(μ + z·σ)`, `z = Φ⁻¹(1-c)`
//! - Parametric t: `-(μ + t_ppf(1-c; ν, loc, scale))` from an MLE Student-t fit
//! - Monte Carlo: historical VaR of draws from `N(μ, σ)`
//! - Extreme value: peaks-over-threshold with a fitted GPD
//! - Cornish-Fisher: normal quantile corrected for skewness and kurtosis
//!
//! [`VarEngine::estimate`] wraps each method with the fallback policy: a
//! method that cannot produce a finite value reports the historical VaR
//! instead, tagged with the reason.

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal as StatrsNormal, StudentsT};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{check_confidence, Result, TailRiskError};
use crate::fit;
use crate::stats;
use crate::tail::PeaksOverThreshold;

/// VaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Historical,
    ParametricNormal,
    ParametricT,
    MonteCarlo,
    ExtremeValue,
    CornishFisher,
}

impl VarMethod {
    pub const ALL: [VarMethod; 6] = [
        VarMethod::Historical,
        VarMethod::ParametricNormal,
        VarMethod::ParametricT,
        VarMethod::MonteCarlo,
        VarMethod::ExtremeValue,
        VarMethod::CornishFisher,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VarMethod::Historical => "historical",
            VarMethod::ParametricNormal => "parametric_normal",
            VarMethod::ParametricT => "parametric_t",
            VarMethod::MonteCarlo => "monte_carlo",
            VarMethod::ExtremeValue => "extreme_value",
            VarMethod::CornishFisher => "cornish_fisher",
        }
    }
}

/// Why an estimator reported the historical VaR instead of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Fewer threshold exceedances than the GPD fit requires
    InsufficientExceedances { found: usize, required: usize },
    /// The distribution fit or sampler raised an error
    FitFailed { message: String },
    /// The method produced NaN or an infinite value
    NonFinite,
}

/// One VaR figure with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub method: VarMethod,
    pub confidence_level: f64,
    /// Loss fraction (positive = loss)
    pub value: f64,
    /// Set when the value is the historical fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
}

impl VarEstimate {
    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

/// VaR backtesting result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBacktestResult {
    /// Number of VaR predictions
    pub num_predictions: usize,

    /// Number of violations (actual loss exceeded VaR)
    pub num_violations: usize,

    /// Violation rate (num_violations / num_predictions)
    pub violation_rate: f64,

    /// Expected violation rate based on confidence level
    pub expected_violation_rate: f64,

    /// Whether the violation rate sits inside the two-sigma binomial band
    pub validated: bool,
}

/// VaR engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    /// Number of Monte Carlo draws
    pub simulations: usize,

    /// Random seed for Monte Carlo draws; `None` seeds from the sample itself
    pub random_seed: Option<u64>,

    /// Loss percentile used as the EVT threshold
    pub evt_threshold_percentile: f64,

    /// Minimum exceedances before a GPD is fitted
    pub min_exceedances: usize,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            random_seed: None,
            evt_threshold_percentile: 90.0,
            min_exceedances: 10,
        }
    }
}

/// Monte Carlo seed derived from the bit pattern of a sample
fn sample_seed(returns: &[f64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    returns.len().hash(&mut hasher);
    for r in returns {
        r.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// VaR calculation engine
#[derive(Debug, Clone, Default)]
pub struct VarEngine {
    config: VarConfig,
}

impl VarEngine {
    pub fn new(config: VarConfig) -> Self {
        Self { config }
    }

    /// Historical VaR: negated lower-tail percentile of the sample
    pub fn historical(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        let q = stats::percentile(returns, (1.0 - confidence_level) * 100.0)?;
        Ok(-q)
    }

    /// Parametric VaR assuming normally distributed returns
    pub fn parametric_normal(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        non_empty(returns)?;

        let z = standard_normal()?.inverse_cdf(1.0 - confidence_level);
        let mean = stats::mean(returns);
        let std = stats::std_dev(returns);

        Ok(-(mean + z * std))
    }

    /// Parametric VaR from a maximum-likelihood Student-t fit
    pub fn parametric_t(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        let fit = fit::fit_student_t(returns)?;
        let t = StudentsT::new(fit.location, fit.scale, fit.dof)
            .map_err(|e| TailRiskError::FitFailure(e.to_string()))?;

        let quantile = t.inverse_cdf(1.0 - confidence_level);
        Ok(-(stats::mean(returns) + quantile))
    }

    /// Monte Carlo VaR from normal draws matching the sample mean and volatility
    pub fn monte_carlo(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        non_empty(returns)?;

        if self.config.simulations == 0 {
            return Err(TailRiskError::InvalidParameter(
                "Number of simulations must be positive".to_string(),
            ));
        }

        let seed = self
            .config
            .random_seed
            .unwrap_or_else(|| sample_seed(returns));
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

        let normal = Normal::new(stats::mean(returns), stats::std_dev(returns))
            .map_err(|e| TailRiskError::FitFailure(e.to_string()))?;

        let simulated: Vec<f64> = (0..self.config.simulations)
            .map(|_| normal.sample(&mut rng))
            .collect();

        self.historical(&simulated, confidence_level)
    }

    /// Peaks-over-threshold VaR with a fitted Generalized Pareto tail
    ///
    /// Fails with `InsufficientData` when fewer than `min_exceedances` losses
    /// exceed the threshold.
    pub fn extreme_value(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        let pot = PeaksOverThreshold::from_returns(returns, self.config.evt_threshold_percentile)?;

        if pot.exceedances.len() < self.config.min_exceedances {
            return Err(TailRiskError::InsufficientData(format!(
                "Need at least {} exceedances, got {}",
                self.config.min_exceedances,
                pot.exceedances.len()
            )));
        }

        let gpd = fit::fit_gpd(&pot.exceedances)?;
        Ok(gpd.tail_quantile(
            pot.threshold,
            pot.sample_size,
            pot.exceedances.len(),
            confidence_level,
        ))
    }

    /// Cornish-Fisher VaR
    ///
    /// `z_cf = z + (z²−1)S/6 + (z³−3z)K/24 − (2z³−5z)S²/36`
    pub fn cornish_fisher(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        non_empty(returns)?;

        let m = stats::moments(returns);
        let z = standard_normal()?.inverse_cdf(1.0 - confidence_level);
        let (s, k) = (m.skewness, m.excess_kurtosis);

        let z_cf = z + (z * z - 1.0) * s / 6.0 + (z.powi(3) - 3.0 * z) * k / 24.0
            - (2.0 * z.powi(3) - 5.0 * z) * s * s / 36.0;

        Ok(-(m.mean + z_cf * m.std_dev))
    }

    /// Run one method without the fallback policy
    pub fn calculate(&self, method: VarMethod, returns: &[f64], confidence_level: f64) -> Result<f64> {
        match method {
            VarMethod::Historical => self.historical(returns, confidence_level),
            VarMethod::ParametricNormal => self.parametric_normal(returns, confidence_level),
            VarMethod::ParametricT => self.parametric_t(returns, confidence_level),
            VarMethod::MonteCarlo => self.monte_carlo(returns, confidence_level),
            VarMethod::ExtremeValue => self.extreme_value(returns, confidence_level),
            VarMethod::CornishFisher => self.cornish_fisher(returns, confidence_level),
        }
    }

    /// Run one method, falling back to historical VaR when it fails
    ///
    /// Only errors that also prevent the historical estimate (empty sample,
    /// invalid confidence level) are returned.
    pub fn estimate(
        &self,
        method: VarMethod,
        returns: &[f64],
        confidence_level: f64,
    ) -> Result<VarEstimate> {
        let historical = self.historical(returns, confidence_level)?;
        if method == VarMethod::Historical {
            return Ok(VarEstimate {
                method,
                confidence_level,
                value: historical,
                fallback: None,
            });
        }

        let fallback = match self.calculate(method, returns, confidence_level) {
            Ok(value) if value.is_finite() => {
                return Ok(VarEstimate {
                    method,
                    confidence_level,
                    value,
                    fallback: None,
                })
            }
            Ok(_) => FallbackReason::NonFinite,
            Err(TailRiskError::InsufficientData(_)) if method == VarMethod::ExtremeValue => {
                FallbackReason::InsufficientExceedances {
                    found: PeaksOverThreshold::from_returns(
                        returns,
                        self.config.evt_threshold_percentile,
                    )
                    .map(|pot| pot.exceedances.len())
                    .unwrap_or(0),
                    required: self.config.min_exceedances,
                }
            }
            Err(e) => FallbackReason::FitFailed {
                message: e.to_string(),
            },
        };

        tracing::warn!(
            method = method.name(),
            confidence_level,
            reason = ?fallback,
            "VaR method fell back to historical"
        );

        Ok(VarEstimate {
            method,
            confidence_level,
            value: historical,
            fallback: Some(fallback),
        })
    }

    /// Every method at every confidence level
    pub fn estimate_all(&self, returns: &[f64], confidence_levels: &[f64]) -> Result<Vec<VarEstimate>> {
        let mut estimates = Vec::with_capacity(confidence_levels.len() * VarMethod::ALL.len());
        for &c in confidence_levels {
            for method in VarMethod::ALL {
                estimates.push(self.estimate(method, returns, c)?);
            }
        }
        Ok(estimates)
    }

    /// Backtest rolling historical VaR forecasts against realised losses
    ///
    /// Each return after the first `window` observations is compared with the
    /// historical VaR of the preceding `window` returns.
    pub fn backtest(
        &self,
        returns: &[f64],
        window: usize,
        confidence_level: f64,
    ) -> Result<VarBacktestResult> {
        check_confidence(confidence_level)?;
        if window < 2 {
            return Err(TailRiskError::InvalidParameter(
                "Backtest window must be at least 2".to_string(),
            ));
        }
        if returns.len() <= window {
            return Err(TailRiskError::InsufficientData(format!(
                "Need more than {} returns to backtest, got {}",
                window,
                returns.len()
            )));
        }

        let mut num_violations = 0;
        for i in window..returns.len() {
            let forecast = self.historical(&returns[i - window..i], confidence_level)?;
            if -returns[i] > forecast {
                num_violations += 1;
            }
        }

        let num_predictions = returns.len() - window;
        let violation_rate = num_violations as f64 / num_predictions as f64;
        let expected_violation_rate = 1.0 - confidence_level;

        let std_error = (expected_violation_rate * (1.0 - expected_violation_rate)
            / num_predictions as f64)
            .sqrt();
        let lower_bound = (expected_violation_rate - 2.0 * std_error).max(0.0);
        let upper_bound = (expected_violation_rate + 2.0 * std_error).min(1.0);

        Ok(VarBacktestResult {
            num_predictions,
            num_violations,
            violation_rate,
            expected_violation_rate,
            validated: violation_rate >= lower_bound && violation_rate <= upper_bound,
        })
    }
}

pub(crate) fn standard_normal() -> Result<StatrsNormal> {
    StatrsNormal::new(0.0, 1.0).map_err(|e| TailRiskError::NumericalInstability(e.to_string()))
}

fn non_empty(returns: &[f64]) -> Result<()> {
    if returns.is_empty() {
        return Err(TailRiskError::InsufficientData(
            "Return sample is empty".to_string(),
        ));
    }
    Ok(())
}
