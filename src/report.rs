//! Risk report and dashboard types
//!
//! Every numeric field in a report is finite. Values that cannot be computed
//! are `None` (serialized as `null`) or live inside a [`Section`] tagged
//! `insufficient_data` / `calculation_failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::correlation::CorrelationAnalysis;
use crate::cvar::{CvarEstimate, CvarMethod};
use crate::drawdown::DrawdownAnalysis;
use crate::error::Result;
use crate::stats::Moments;
use crate::stress::StressTestReport;
use crate::tail::{EvtAnalysis, TailMetrics};
use crate::var::{VarBacktestResult, VarEstimate, VarMethod};

/// A report section that may be unavailable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ok(T),
    InsufficientData { required: usize, available: usize },
    CalculationFailed { reason: String },
}

impl<T> Section<T> {
    pub fn ok(&self) -> Option<&T> {
        match self {
            Section::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Section::Ok(_))
    }

    /// Status tag as it appears in serialized output
    pub fn status(&self) -> &'static str {
        match self {
            Section::Ok(_) => "ok",
            Section::InsufficientData { .. } => "insufficient_data",
            Section::CalculationFailed { .. } => "calculation_failed",
        }
    }
}

impl<T> From<Result<T>> for Section<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Section::Ok(value),
            Err(e) => Section::CalculationFailed {
                reason: e.to_string(),
            },
        }
    }
}

/// Look up one VaR figure
pub(crate) fn find_var(estimates: &[VarEstimate], method: VarMethod, confidence_level: f64) -> Option<f64> {
    estimates
        .iter()
        .find(|e| e.method == method && (e.confidence_level - confidence_level).abs() < 1e-12)
        .map(|e| e.value)
}

/// Look up one CVaR figure
pub(crate) fn find_cvar(estimates: &[CvarEstimate], method: CvarMethod, confidence_level: f64) -> Option<f64> {
    estimates
        .iter()
        .find(|e| e.method == method && (e.confidence_level - confidence_level).abs() < 1e-12)
        .map(|e| e.value)
}

/// Risk metrics of one tradable symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRiskMetrics {
    pub symbol: String,
    /// Returns in the analysis window
    pub observations: usize,
    pub latest_price: Option<f64>,
    pub moments: Moments,
    pub var: Vec<VarEstimate>,
    pub cvar: Vec<CvarEstimate>,
    pub drawdown: Section<DrawdownAnalysis>,
    pub evt: EvtAnalysis,
    pub tail_metrics: Section<TailMetrics>,
}

impl AssetRiskMetrics {
    pub fn var(&self, method: VarMethod, confidence_level: f64) -> Option<f64> {
        find_var(&self.var, method, confidence_level)
    }

    pub fn cvar(&self, method: CvarMethod, confidence_level: f64) -> Option<f64> {
        find_cvar(&self.cvar, method, confidence_level)
    }
}

/// Historical VaR and CVaR in currency units at one confidence level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DollarRisk {
    pub confidence_level: f64,
    pub var_dollar: f64,
    pub cvar_dollar: f64,
}

/// Portfolio-level risk metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskMetrics {
    pub observations: usize,
    pub portfolio_value: f64,
    pub moments: Moments,
    pub var: Vec<VarEstimate>,
    pub cvar: Vec<CvarEstimate>,
    pub dollar_risk: Vec<DollarRisk>,
    pub drawdown: Section<DrawdownAnalysis>,
    pub evt: EvtAnalysis,
    pub tail_metrics: Section<TailMetrics>,
    /// Herfindahl-Hirschman index of the latest position weights
    pub concentration_hhi: Option<f64>,
    /// Rolling historical VaR@95% backtest
    pub var_backtest: Option<VarBacktestResult>,
}

impl PortfolioRiskMetrics {
    pub fn var(&self, method: VarMethod, confidence_level: f64) -> Option<f64> {
        find_var(&self.var, method, confidence_level)
    }

    pub fn cvar(&self, method: CvarMethod, confidence_level: f64) -> Option<f64> {
        find_cvar(&self.cvar, method, confidence_level)
    }
}

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighVar,
    DeepDrawdown,
    HighCorrelation,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold breach raised by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

/// Categorical risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    /// No portfolio metrics available
    Unknown,
}

impl RiskLevel {
    /// Classify from the 95% historical VaR and the current drawdown
    pub fn classify(var_95: f64, current_drawdown: f64) -> Self {
        let dd = current_drawdown.abs();
        if var_95 > 0.05 || dd > 0.20 {
            RiskLevel::High
        } else if var_95 > 0.03 || dd > 0.10 {
            RiskLevel::Medium
        } else if var_95 > 0.01 || dd > 0.05 {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::VeryLow => "very_low",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }
}

/// Full risk report, created fresh on every computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: f64,
    pub confidence_levels: Vec<f64>,
    pub asset_metrics: BTreeMap<String, Section<AssetRiskMetrics>>,
    pub portfolio_metrics: Section<PortfolioRiskMetrics>,
    pub correlation_analysis: Section<CorrelationAnalysis>,
    pub stress_tests: StressTestReport,
    pub alerts: Vec<RiskAlert>,
    pub risk_level: RiskLevel,
}

impl RiskReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compact projection for UIs and alerting
    pub fn dashboard_summary(&self) -> DashboardSummary {
        let portfolio = self.portfolio_metrics.ok();
        let var_95 = portfolio.and_then(|p| p.var(VarMethod::Historical, 0.95));
        let cvar_95 = portfolio.and_then(|p| p.cvar(CvarMethod::Historical, 0.95));
        let drawdown = portfolio.and_then(|p| p.drawdown.ok());

        DashboardSummary {
            portfolio_value: self.portfolio_value,
            var_95_pct: var_95.map(|v| v * 100.0),
            var_95_dollar: var_95.map(|v| v * self.portfolio_value),
            cvar_95_pct: cvar_95.map(|v| v * 100.0),
            cvar_95_dollar: cvar_95.map(|v| v * self.portfolio_value),
            max_drawdown_pct: drawdown.map(|d| d.max_drawdown * 100.0),
            current_drawdown_pct: drawdown.map(|d| d.current_drawdown * 100.0),
            risk_level: self.risk_level,
            active_alerts: self.alerts.len(),
            last_update: self.timestamp,
        }
    }
}

/// Dashboard projection of a [`RiskReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub portfolio_value: f64,
    pub var_95_pct: Option<f64>,
    pub var_95_dollar: Option<f64>,
    pub cvar_95_pct: Option<f64>,
    pub cvar_95_dollar: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub current_drawdown_pct: Option<f64>,
    pub risk_level: RiskLevel,
    pub active_alerts: usize,
    pub last_update: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TailRiskError;

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::classify(0.06, 0.0), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.0, -0.25), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.04, -0.02), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.02, -0.02), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.005, -0.06), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.005, -0.01), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::classify(-0.01, 0.0), RiskLevel::VeryLow);
    }

    #[test]
    fn test_section_serialization() {
        let ok: Section<TailMetrics> = Section::Ok(TailMetrics {
            worst_5pct_mean: -0.03,
            worst_1pct_mean: -0.05,
            central_mean: 0.0,
            tail_ratio_5pct: None,
            tail_ratio_1pct: None,
        });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["worst_5pct_mean"], -0.03);
        assert!(json["tail_ratio_5pct"].is_null());

        let missing: Section<TailMetrics> = Section::InsufficientData {
            required: 30,
            available: 12,
        };
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["status"], "insufficient_data");
        assert_eq!(json["available"], 12);

        let back: Section<TailMetrics> = serde_json::from_value(json).unwrap();
        assert_eq!(back, missing);
    }

    #[test]
    fn test_section_from_result() {
        let failed: Section<f64> = Err(TailRiskError::FitFailure("diverged".to_string())).into();
        assert_eq!(failed.status(), "calculation_failed");
        assert!(failed.ok().is_none());

        let ok: Section<f64> = Ok(1.5).into();
        assert_eq!(ok.ok(), Some(&1.5));
    }
}
