//! Stress testing and scenario analysis
//!
//! Implements the scenario types recognised in configuration:
//! - Market shock: scale the portfolio value by `(1 + shock)`
//! - Volatility multiplier: recompute normal VaR at 95% / 99% with scaled volatility
//! - Correlation breakdown: volatility if every pairwise correlation became 1
//! - Custom: parameters are passed through untouched for downstream consumers

use serde::{Deserialize, Serialize};
use statrs::distribution::ContinuousCDF;
use std::collections::BTreeMap;

use crate::config::StressScenarioConfig;
use crate::error::{Result, TailRiskError};
use crate::stats;
use crate::var::standard_normal;

/// Outcome of a fixed market shock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketShockResult {
    pub shock: f64,
    pub original_value: f64,
    pub shocked_value: f64,
    pub loss_amount: f64,
    /// Loss as a percentage of the original value (30.0 = 30%)
    pub loss_percentage: f64,
}

/// Normal VaR under a scaled volatility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityStressResult {
    pub multiplier: f64,
    pub base_volatility: f64,
    pub stressed_volatility: f64,
    pub stressed_var_95: f64,
    pub stressed_var_99: f64,
    pub stressed_var_95_dollar: f64,
    pub stressed_var_99_dollar: f64,
}

/// Volatility lost to perfect correlation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationBreakdownResult {
    /// Observed (diversified) portfolio volatility
    pub normal_volatility: f64,
    /// Average individual asset volatility (all correlations = 1)
    pub stressed_volatility: f64,
    pub diversification_loss: f64,
    /// Relative increase in volatility, in percent; `None` when the normal volatility is 0
    pub volatility_increase_pct: Option<f64>,
}

/// Result of one configured scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    MarketShock(MarketShockResult),
    VolatilityMultiplier(VolatilityStressResult),
    CorrelationBreakdown(CorrelationBreakdownResult),
    /// Custom scenario, parameters passed through without interpretation
    Custom {
        description: Option<String>,
        parameters: BTreeMap<String, f64>,
    },
    /// The scenario could not be evaluated with the available history
    Unavailable { reason: String },
}

impl ScenarioOutcome {
    /// Dollar loss implied by the scenario, when it has one
    pub fn loss_amount(&self) -> Option<f64> {
        match self {
            ScenarioOutcome::MarketShock(r) => Some(r.loss_amount),
            ScenarioOutcome::VolatilityMultiplier(r) => Some(r.stressed_var_99_dollar),
            _ => None,
        }
    }
}

/// Comprehensive stress test report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestReport {
    pub portfolio_value: f64,

    /// Scenario results keyed by scenario name
    pub scenarios: BTreeMap<String, ScenarioOutcome>,

    /// Scenario with the largest dollar loss
    pub worst_scenario: Option<String>,

    /// Largest dollar loss across scenarios
    pub max_loss: f64,
}

/// Inputs for one stress run
#[derive(Debug, Clone, Copy)]
pub struct StressInputs<'a> {
    /// Current portfolio value
    pub portfolio_value: f64,
    /// Portfolio return history
    pub portfolio_returns: &'a [f64],
    /// Aligned per-asset return histories
    pub asset_returns: &'a [Vec<f64>],
}

/// Stress testing engine
#[derive(Debug, Clone, Default)]
pub struct StressTestEngine {
    scenarios: BTreeMap<String, StressScenarioConfig>,
}

impl StressTestEngine {
    pub fn new(scenarios: BTreeMap<String, StressScenarioConfig>) -> Self {
        Self { scenarios }
    }

    pub fn scenarios(&self) -> &BTreeMap<String, StressScenarioConfig> {
        &self.scenarios
    }

    /// Apply a fixed shock to the portfolio value
    pub fn market_shock(portfolio_value: f64, shock: f64) -> Result<MarketShockResult> {
        if !(portfolio_value.is_finite() && portfolio_value > 0.0) {
            return Err(TailRiskError::InvalidParameter(format!(
                "Portfolio value must be positive, got {}",
                portfolio_value
            )));
        }
        if !shock.is_finite() || shock < -1.0 {
            return Err(TailRiskError::InvalidParameter(format!(
                "Market shock must be finite and >= -1, got {}",
                shock
            )));
        }

        let shocked_value = portfolio_value * (1.0 + shock);
        let loss_amount = portfolio_value - shocked_value;

        Ok(MarketShockResult {
            shock,
            original_value: portfolio_value,
            shocked_value,
            loss_amount,
            loss_percentage: 100.0 * loss_amount / portfolio_value,
        })
    }

    /// Normal VaR at 95% / 99% with the historical volatility scaled by `multiplier`
    pub fn volatility_stress(
        portfolio_value: f64,
        portfolio_returns: &[f64],
        multiplier: f64,
    ) -> Result<VolatilityStressResult> {
        if portfolio_returns.len() < 2 {
            return Err(TailRiskError::InsufficientData(format!(
                "Volatility stress needs at least 2 portfolio returns, got {}",
                portfolio_returns.len()
            )));
        }
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(TailRiskError::InvalidParameter(format!(
                "Volatility multiplier must be positive, got {}",
                multiplier
            )));
        }

        let normal = standard_normal()?;
        let mean = stats::mean(portfolio_returns);
        let base_volatility = stats::std_dev(portfolio_returns);
        let stressed_volatility = base_volatility * multiplier;

        let var_at = |c: f64| -(mean + normal.inverse_cdf(1.0 - c) * stressed_volatility);
        let stressed_var_95 = var_at(0.95);
        let stressed_var_99 = var_at(0.99);

        Ok(VolatilityStressResult {
            multiplier,
            base_volatility,
            stressed_volatility,
            stressed_var_95,
            stressed_var_99,
            stressed_var_95_dollar: stressed_var_95 * portfolio_value,
            stressed_var_99_dollar: stressed_var_99 * portfolio_value,
        })
    }

    /// Portfolio volatility if all pairwise correlations went to 1
    pub fn correlation_breakdown(
        portfolio_returns: &[f64],
        asset_returns: &[Vec<f64>],
    ) -> Result<CorrelationBreakdownResult> {
        if asset_returns.len() < 2 {
            return Err(TailRiskError::InsufficientData(format!(
                "Correlation breakdown needs at least 2 assets, got {}",
                asset_returns.len()
            )));
        }
        if portfolio_returns.len() < 2 {
            return Err(TailRiskError::InsufficientData(
                "Correlation breakdown needs portfolio return history".to_string(),
            ));
        }

        let vols: Vec<f64> = asset_returns.iter().map(|r| stats::std_dev(r)).collect();
        let stressed_volatility = stats::mean(&vols);
        let normal_volatility = stats::std_dev(portfolio_returns);
        let diversification_loss = stressed_volatility - normal_volatility;

        Ok(CorrelationBreakdownResult {
            normal_volatility,
            stressed_volatility,
            diversification_loss,
            volatility_increase_pct: (normal_volatility > 1e-15)
                .then(|| 100.0 * diversification_loss / normal_volatility),
        })
    }

    /// Evaluate one configured scenario; data shortfalls become `Unavailable`
    pub fn run_scenario(&self, scenario: &StressScenarioConfig, inputs: &StressInputs<'_>) -> ScenarioOutcome {
        let outcome = match scenario {
            StressScenarioConfig::MarketShock { shock } => {
                Self::market_shock(inputs.portfolio_value, *shock).map(ScenarioOutcome::MarketShock)
            }
            StressScenarioConfig::VolatilityMultiplier { multiplier } => Self::volatility_stress(
                inputs.portfolio_value,
                inputs.portfolio_returns,
                *multiplier,
            )
            .map(ScenarioOutcome::VolatilityMultiplier),
            StressScenarioConfig::CorrelationBreakdown => {
                Self::correlation_breakdown(inputs.portfolio_returns, inputs.asset_returns)
                    .map(ScenarioOutcome::CorrelationBreakdown)
            }
            StressScenarioConfig::Custom {
                description,
                parameters,
            } => Ok(ScenarioOutcome::Custom {
                description: description.clone(),
                parameters: parameters.clone(),
            }),
        };

        outcome.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Stress scenario unavailable");
            ScenarioOutcome::Unavailable {
                reason: e.to_string(),
            }
        })
    }

    /// Run every configured scenario and summarise the worst loss
    pub fn run_all(&self, inputs: &StressInputs<'_>) -> StressTestReport {
        let scenarios: BTreeMap<String, ScenarioOutcome> = self
            .scenarios
            .iter()
            .map(|(name, scenario)| (name.clone(), self.run_scenario(scenario, inputs)))
            .collect();

        let mut worst_scenario = None;
        let mut max_loss = 0.0;
        for (name, outcome) in &scenarios {
            if let Some(loss) = outcome.loss_amount() {
                if worst_scenario.is_none() || loss > max_loss {
                    worst_scenario = Some(name.clone());
                    max_loss = loss;
                }
            }
        }

        StressTestReport {
            portfolio_value: inputs.portfolio_value,
            scenarios,
            worst_scenario,
            max_loss,
        }
    }
}
