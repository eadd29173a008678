use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TailRiskError};

/// Risk engine configuration
///
/// Immutable for the lifetime of one aggregator; replaced wholesale on
/// reconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Confidence levels for VaR/CVaR, stored ascending and de-duplicated
    #[serde(default = "default_confidence_levels")]
    pub confidence_levels: Vec<f64>,

    /// Most recent returns fed into every estimator
    #[serde(default = "default_lookback_periods")]
    pub lookback_periods: usize,

    /// Portfolio value used when no snapshot has been recorded
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,

    /// Named stress scenarios
    #[serde(default = "default_stress_scenarios")]
    pub stress_scenarios: BTreeMap<String, StressScenarioConfig>,

    /// Advisory recomputation cadence for the external scheduler
    #[serde(default = "default_update_frequency_secs")]
    pub update_frequency_secs: u64,

    /// Ring buffer capacity of the ledgers
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Minimum returns before a symbol or the portfolio is analyzed
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Monte Carlo draws per VaR estimate
    #[serde(default = "default_monte_carlo_simulations")]
    pub monte_carlo_simulations: usize,

    /// Seed for reproducible Monte Carlo runs
    #[serde(default)]
    pub random_seed: Option<u64>,

    /// Recovery estimate used when no drawdown period has completed
    #[serde(default = "default_recovery_default_periods")]
    pub recovery_default_periods: f64,

    /// Alert trigger levels
    #[serde(default)]
    pub alert_thresholds: AlertThresholds,
}

/// Alert trigger levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Portfolio historical VaR@95% above this fraction raises an alert
    #[serde(default = "default_var_95_threshold")]
    pub var_95: f64,

    /// Current drawdown deeper than this fraction raises an alert
    #[serde(default = "default_drawdown_threshold")]
    pub drawdown: f64,

    /// Average pairwise correlation above this raises an alert
    #[serde(default = "default_correlation_threshold")]
    pub correlation: f64,
}

/// Stress scenario definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StressScenarioConfig {
    /// Scale the portfolio value by `(1 + shock)`
    MarketShock { shock: f64 },

    /// Scale historical portfolio volatility
    VolatilityMultiplier { multiplier: f64 },

    /// All pairwise correlations go to 1
    CorrelationBreakdown,

    /// Passed through without interpretation
    Custom {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parameters: BTreeMap<String, f64>,
    },
}

impl StressScenarioConfig {
    fn validate(&self, name: &str) -> Result<()> {
        match self {
            StressScenarioConfig::MarketShock { shock } => {
                if !shock.is_finite() || *shock < -1.0 {
                    return Err(TailRiskError::Configuration(format!(
                        "Scenario '{}': shock must be finite and >= -1, got {}",
                        name, shock
                    )));
                }
            }
            StressScenarioConfig::VolatilityMultiplier { multiplier } => {
                if !(multiplier.is_finite() && *multiplier > 0.0) {
                    return Err(TailRiskError::Configuration(format!(
                        "Scenario '{}': multiplier must be positive, got {}",
                        name, multiplier
                    )));
                }
            }
            StressScenarioConfig::CorrelationBreakdown => {}
            StressScenarioConfig::Custom { parameters, .. } => {
                if let Some((key, value)) = parameters.iter().find(|(_, v)| !v.is_finite()) {
                    return Err(TailRiskError::Configuration(format!(
                        "Scenario '{}': parameter '{}' is not finite ({})",
                        name, key, value
                    )));
                }
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_confidence_levels() -> Vec<f64> {
    vec![0.95, 0.99, 0.995]
}

fn default_lookback_periods() -> usize {
    252
}

fn default_portfolio_value() -> f64 {
    1_000_000.0
}

fn default_stress_scenarios() -> BTreeMap<String, StressScenarioConfig> {
    let mut scenarios = BTreeMap::new();
    scenarios.insert(
        "market_crash".to_string(),
        StressScenarioConfig::MarketShock { shock: -0.20 },
    );
    scenarios.insert(
        "severe_crash".to_string(),
        StressScenarioConfig::MarketShock { shock: -0.30 },
    );
    scenarios.insert(
        "flash_crash".to_string(),
        StressScenarioConfig::MarketShock { shock: -0.10 },
    );
    scenarios.insert(
        "volatility_spike".to_string(),
        StressScenarioConfig::VolatilityMultiplier { multiplier: 2.0 },
    );
    scenarios.insert(
        "extreme_volatility".to_string(),
        StressScenarioConfig::VolatilityMultiplier { multiplier: 3.0 },
    );
    scenarios.insert(
        "correlation_breakdown".to_string(),
        StressScenarioConfig::CorrelationBreakdown,
    );
    scenarios
}

fn default_update_frequency_secs() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    crate::ledger::DEFAULT_CAPACITY
}

fn default_min_observations() -> usize {
    30
}

fn default_monte_carlo_simulations() -> usize {
    10_000
}

fn default_recovery_default_periods() -> f64 {
    crate::drawdown::DEFAULT_RECOVERY_PERIODS
}

fn default_var_95_threshold() -> f64 {
    0.05
}

fn default_drawdown_threshold() -> f64 {
    0.10
}

fn default_correlation_threshold() -> f64 {
    0.8
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            var_95: default_var_95_threshold(),
            drawdown: default_drawdown_threshold(),
            correlation: default_correlation_threshold(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confidence_levels: default_confidence_levels(),
            lookback_periods: default_lookback_periods(),
            portfolio_value: default_portfolio_value(),
            stress_scenarios: default_stress_scenarios(),
            update_frequency_secs: default_update_frequency_secs(),
            history_capacity: default_history_capacity(),
            min_observations: default_min_observations(),
            monte_carlo_simulations: default_monte_carlo_simulations(),
            random_seed: None,
            recovery_default_periods: default_recovery_default_periods(),
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

impl RiskConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RiskConfig = serde_yaml::from_str(yaml)?;
        config.validated()
    }

    /// Read, parse and validate a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RiskConfig =
            serde_json::from_str(json).map_err(|e| TailRiskError::Configuration(e.to_string()))?;
        config.validated()
    }

    /// Check every option, sorting and de-duplicating confidence levels
    pub fn validated(mut self) -> Result<Self> {
        if self.confidence_levels.is_empty() {
            return Err(TailRiskError::Configuration(
                "At least one confidence level is required".to_string(),
            ));
        }
        if let Some(c) = self
            .confidence_levels
            .iter()
            .find(|c| !(c.is_finite() && **c > 0.0 && **c < 1.0))
        {
            return Err(TailRiskError::Configuration(format!(
                "Confidence level must be in (0, 1), got {}",
                c
            )));
        }
        self.confidence_levels.sort_by(|a, b| a.total_cmp(b));
        self.confidence_levels.dedup();

        if !(self.portfolio_value.is_finite() && self.portfolio_value > 0.0) {
            return Err(TailRiskError::Configuration(format!(
                "Portfolio value must be positive, got {}",
                self.portfolio_value
            )));
        }
        if !(self.recovery_default_periods.is_finite() && self.recovery_default_periods >= 0.0) {
            return Err(TailRiskError::Configuration(format!(
                "Default recovery periods must be non-negative, got {}",
                self.recovery_default_periods
            )));
        }

        let minimums = [
            ("lookback_periods", self.lookback_periods, 2),
            ("history_capacity", self.history_capacity, 2),
            ("min_observations", self.min_observations, 2),
            ("monte_carlo_simulations", self.monte_carlo_simulations, 1),
        ];
        for (name, value, min) in minimums {
            if value < min {
                return Err(TailRiskError::Configuration(format!(
                    "{} must be at least {}, got {}",
                    name, min, value
                )));
            }
        }
        if self.update_frequency_secs == 0 {
            return Err(TailRiskError::Configuration(
                "update_frequency_secs must be at least 1".to_string(),
            ));
        }

        for (name, scenario) in &self.stress_scenarios {
            scenario.validate(name)?;
        }

        Ok(self)
    }

    /// Validate in place
    pub fn validate(&mut self) -> Result<()> {
        *self = self.clone().validated()?;
        Ok(())
    }

    /// Confidence levels the report covers: configured levels plus 0.95
    ///
    /// 0.95 always feeds the alerts, the risk level and the dashboard.
    pub fn reporting_levels(&self) -> Vec<f64> {
        let mut levels = self.confidence_levels.clone();
        if !levels.iter().any(|c| (c - 0.95).abs() < 1e-12) {
            levels.push(0.95);
            levels.sort_by(|a, b| a.total_cmp(b));
        }
        levels
    }

    /// Advisory update cadence as Duration
    pub fn update_frequency(&self) -> Duration {
        Duration::from_secs(self.update_frequency_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RiskConfig::default();
        assert_eq!(config.confidence_levels, vec![0.95, 0.99, 0.995]);
        assert_eq!(config.lookback_periods, 252);
        assert_eq!(config.portfolio_value, 1_000_000.0);
        assert_eq!(config.update_frequency(), Duration::from_secs(300));
        assert_eq!(
            config.stress_scenarios["severe_crash"],
            StressScenarioConfig::MarketShock { shock: -0.30 }
        );
        assert!(config.clone().validated().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
confidence_levels: [0.99, 0.95, 0.99]
portfolio_value: 250000.0
random_seed: 7
stress_scenarios:
  crash:
    type: market_shock
    shock: -0.25
  vol:
    type: volatility_multiplier
    multiplier: 2.5
  breakdown:
    type: correlation_breakdown
  rates:
    type: custom
    description: Parallel rate shift
    parameters:
      bps: 200.0
"#;

        let config = RiskConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.confidence_levels, vec![0.95, 0.99]);
        assert_eq!(config.portfolio_value, 250_000.0);
        assert_eq!(config.random_seed, Some(7));
        assert_eq!(config.lookback_periods, 252);
        assert_eq!(config.stress_scenarios.len(), 4);
        assert_eq!(
            config.stress_scenarios["vol"],
            StressScenarioConfig::VolatilityMultiplier { multiplier: 2.5 }
        );
        assert!(matches!(
            &config.stress_scenarios["rates"],
            StressScenarioConfig::Custom { parameters, .. } if parameters["bps"] == 200.0
        ));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{"confidence_levels": [0.9], "lookback_periods": 100}"#;
        let config = RiskConfig::from_json(json).unwrap();
        assert_eq!(config.confidence_levels, vec![0.9]);
        assert_eq!(config.reporting_levels(), vec![0.9, 0.95]);
        assert_eq!(config.lookback_periods, 100);
    }

    #[test]
    fn test_rejects_bad_confidence() {
        assert!(matches!(
            RiskConfig::from_yaml("confidence_levels: [0.95, 1.0]"),
            Err(TailRiskError::Configuration(_))
        ));
        assert!(RiskConfig::from_yaml("confidence_levels: []").is_err());
        assert!(RiskConfig::from_yaml("confidence_levels: [-0.5]").is_err());
    }

    #[test]
    fn test_rejects_bad_scenarios() {
        let yaml = r#"
stress_scenarios:
  bad:
    type: market_shock
    shock: -1.5
"#;
        assert!(RiskConfig::from_yaml(yaml).is_err());

        let yaml = r#"
stress_scenarios:
  bad:
    type: volatility_multiplier
    multiplier: 0.0
"#;
        assert!(RiskConfig::from_yaml(yaml).is_err());

        let yaml = r#"
stress_scenarios:
  bad:
    type: teleport
"#;
        assert!(RiskConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(RiskConfig::from_yaml("portfolio_value: 0.0").is_err());
        assert!(RiskConfig::from_yaml("lookback_periods: 1").is_err());
        assert!(RiskConfig::from_yaml("update_frequency_secs: 0").is_err());
    }

    #[test]
    fn test_validate_in_place() {
        let mut config = RiskConfig {
            confidence_levels: vec![0.995, 0.95],
            ..RiskConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.confidence_levels, vec![0.95, 0.995]);
    }
}
