//! Conditional VaR (Expected Shortfall)
//!
//! CVaR is the mean loss given that the loss exceeds VaR. Each method is paired
//! with the VaR method of the same name:
//! - Historical: mean of the returns at or beyond the historical VaR
//! - Parametric normal: `-(μ - σ·φ(z)/(1-c))`
//! - Parametric t: mean of the sample's own tail beyond the t-based VaR
//! - Parametric t (analytic): closed-form Student-t expected shortfall

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, StudentsT};

use crate::error::{check_confidence, Result, TailRiskError};
use crate::fit;
use crate::stats;
use crate::var::{standard_normal, FallbackReason, VarEngine};

/// CVaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvarMethod {
    Historical,
    ParametricNormal,
    ParametricT,
    ParametricTAnalytic,
}

impl CvarMethod {
    pub const ALL: [CvarMethod; 4] = [
        CvarMethod::Historical,
        CvarMethod::ParametricNormal,
        CvarMethod::ParametricT,
        CvarMethod::ParametricTAnalytic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CvarMethod::Historical => "historical",
            CvarMethod::ParametricNormal => "parametric_normal",
            CvarMethod::ParametricT => "parametric_t",
            CvarMethod::ParametricTAnalytic => "parametric_t_analytic",
        }
    }
}

/// One CVaR figure with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvarEstimate {
    pub method: CvarMethod,
    pub confidence_level: f64,
    /// Expected loss fraction beyond VaR
    pub value: f64,
    /// Set when the value is the historical CVaR fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
}

/// Expected shortfall engine built on a [`VarEngine`]
#[derive(Debug, Clone, Default)]
pub struct CvarEngine {
    var_engine: VarEngine,
}

impl CvarEngine {
    pub fn new(var_engine: VarEngine) -> Self {
        Self { var_engine }
    }

    /// Mean loss of the returns at or below `-var`, never less than `var`
    fn tail_mean_beyond(returns: &[f64], var: f64) -> f64 {
        let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= -var).collect();
        if tail.is_empty() {
            var
        } else {
            // summing tied values can round one ulp past the quantile
            (-stats::mean(&tail)).max(var)
        }
    }

    /// Historical CVaR
    pub fn historical(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        let var = self.var_engine.historical(returns, confidence_level)?;
        Ok(Self::tail_mean_beyond(returns, var))
    }

    /// Closed-form normal CVaR
    pub fn parametric_normal(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        if returns.is_empty() {
            return Err(TailRiskError::InsufficientData(
                "Return sample is empty".to_string(),
            ));
        }

        let normal = standard_normal()?;
        let alpha = 1.0 - confidence_level;
        let z = normal.inverse_cdf(alpha);
        let mean = stats::mean(returns);
        let std = stats::std_dev(returns);

        Ok(-(mean - std * normal.pdf(z) / alpha))
    }

    /// Student-t CVaR approximated by the empirical tail beyond the t VaR
    pub fn parametric_t(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        let var = self.var_engine.parametric_t(returns, confidence_level)?;
        if !var.is_finite() {
            return Err(TailRiskError::NumericalInstability(
                "Student-t VaR is not finite".to_string(),
            ));
        }
        Ok(Self::tail_mean_beyond(returns, var))
    }

    /// Closed-form Student-t expected shortfall
    ///
    /// `ES = -(loc - scale·f_ν(q)/(1-c)·(ν + q²)/(ν - 1))` with `q` the standard
    /// t quantile at `1-c`. Requires ν > 1.
    pub fn parametric_t_analytic(&self, returns: &[f64], confidence_level: f64) -> Result<f64> {
        check_confidence(confidence_level)?;
        let fit = fit::fit_student_t(returns)?;
        if fit.dof <= 1.0 {
            return Err(TailRiskError::FitFailure(format!(
                "Student-t expected shortfall undefined for {:.3} degrees of freedom",
                fit.dof
            )));
        }

        let standard = StudentsT::new(0.0, 1.0, fit.dof)
            .map_err(|e| TailRiskError::FitFailure(e.to_string()))?;
        let alpha = 1.0 - confidence_level;
        let q = standard.inverse_cdf(alpha);
        let shortfall = standard.pdf(q) / alpha * (fit.dof + q * q) / (fit.dof - 1.0);

        Ok(-(fit.location - fit.scale * shortfall))
    }

    /// Run one method without the fallback policy
    pub fn calculate(&self, method: CvarMethod, returns: &[f64], confidence_level: f64) -> Result<f64> {
        match method {
            CvarMethod::Historical => self.historical(returns, confidence_level),
            CvarMethod::ParametricNormal => self.parametric_normal(returns, confidence_level),
            CvarMethod::ParametricT => self.parametric_t(returns, confidence_level),
            CvarMethod::ParametricTAnalytic => self.parametric_t_analytic(returns, confidence_level),
        }
    }

    /// Run one method, falling back to historical CVaR when it fails
    pub fn estimate(
        &self,
        method: CvarMethod,
        returns: &[f64],
        confidence_level: f64,
    ) -> Result<CvarEstimate> {
        let historical = self.historical(returns, confidence_level)?;
        if method == CvarMethod::Historical {
            return Ok(CvarEstimate {
                method,
                confidence_level,
                value: historical,
                fallback: None,
            });
        }

        let fallback = match self.calculate(method, returns, confidence_level) {
            Ok(value) if value.is_finite() => {
                return Ok(CvarEstimate {
                    method,
                    confidence_level,
                    value,
                    fallback: None,
                })
            }
            Ok(_) => FallbackReason::NonFinite,
            Err(e) => FallbackReason::FitFailed {
                message: e.to_string(),
            },
        };

        tracing::warn!(
            method = method.name(),
            confidence_level,
            reason = ?fallback,
            "CVaR method fell back to historical"
        );

        Ok(CvarEstimate {
            method,
            confidence_level,
            value: historical,
            fallback: Some(fallback),
        })
    }

    /// Every method at every confidence level
    pub fn estimate_all(&self, returns: &[f64], confidence_levels: &[f64]) -> Result<Vec<CvarEstimate>> {
        let mut estimates = Vec::with_capacity(confidence_levels.len() * CvarMethod::ALL.len());
        for &c in confidence_levels {
            for method in CvarMethod::ALL {
                estimates.push(self.estimate(method, returns, c)?);
            }
        }
        Ok(estimates)
    }
}
