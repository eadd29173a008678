//! Risk aggregation
//!
//! [`RiskAggregator`] pulls snapshots of the shared ledgers, runs every
//! analytic component, and produces a [`RiskReport`] with alerts and a
//! categorical risk level. Computations are serialized by an internal guard.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RiskConfig;
use crate::correlation::{CorrelationAnalysis, CorrelationAnalyzer, CorrelationConfig};
use crate::cvar::{CvarEngine, CvarMethod};
use crate::drawdown::{DrawdownEngine, DEFAULT_PERIOD_THRESHOLD};
use crate::error::{Result, TailRiskError};
use crate::ledger::{
    MarketHistory, PortfolioHistory, PortfolioLedger, ReturnLedger, SharedPortfolioLedger,
    SharedReturnLedger,
};
use crate::report::{
    find_cvar, find_var, AlertKind, AlertSeverity, AssetRiskMetrics, DashboardSummary, DollarRisk,
    PortfolioRiskMetrics, RiskAlert, RiskLevel, RiskReport, Section,
};
use crate::stats;
use crate::stress::{StressInputs, StressTestEngine};
use crate::tail::TailAnalyzer;
use crate::var::{VarConfig, VarEngine, VarMethod};

/// Confidence level driving alerts, risk level and the dashboard
const HEADLINE_CONFIDENCE: f64 = 0.95;

/// Composes every analytic component into a risk report
#[derive(Debug)]
pub struct RiskAggregator {
    config: RiskConfig,
    market: SharedReturnLedger,
    portfolio: SharedPortfolioLedger,
    var_engine: VarEngine,
    cvar_engine: CvarEngine,
    drawdown_engine: DrawdownEngine,
    tail_analyzer: TailAnalyzer,
    correlation_analyzer: CorrelationAnalyzer,
    stress_engine: StressTestEngine,
    computation: Mutex<()>,
    last_report: RwLock<Option<RiskReport>>,
}

impl RiskAggregator {
    /// Build an aggregator over existing ledger handles
    ///
    /// Fails with `TailRiskError::Configuration` when the configuration is
    /// invalid.
    pub fn new(
        config: RiskConfig,
        market: SharedReturnLedger,
        portfolio: SharedPortfolioLedger,
    ) -> Result<Self> {
        let config = config.validated()?;

        let var_config = VarConfig {
            simulations: config.monte_carlo_simulations,
            random_seed: config.random_seed,
            ..VarConfig::default()
        };
        let var_engine = VarEngine::new(var_config.clone());

        tracing::debug!(
            confidence_levels = ?config.confidence_levels,
            lookback = config.lookback_periods,
            scenarios = config.stress_scenarios.len(),
            "Risk aggregator configured"
        );

        Ok(Self {
            cvar_engine: CvarEngine::new(var_engine.clone()),
            var_engine,
            drawdown_engine: DrawdownEngine::new(
                DEFAULT_PERIOD_THRESHOLD,
                config.recovery_default_periods,
            ),
            tail_analyzer: TailAnalyzer::new(
                var_config.evt_threshold_percentile,
                var_config.min_exceedances,
            ),
            correlation_analyzer: CorrelationAnalyzer::new(CorrelationConfig {
                min_observations: config.min_observations,
            }),
            stress_engine: StressTestEngine::new(config.stress_scenarios.clone()),
            config,
            market,
            portfolio,
            computation: Mutex::new(()),
            last_report: RwLock::new(None),
        })
    }

    /// Build an aggregator with fresh ledgers sized from the configuration
    pub fn with_config(config: RiskConfig) -> Result<Self> {
        let capacity = config.history_capacity;
        Self::new(
            config,
            ReturnLedger::shared(capacity),
            PortfolioLedger::shared(capacity),
        )
    }

    /// New aggregator with a replacement configuration over the same ledgers
    pub fn reconfigured(&self, config: RiskConfig) -> Result<Self> {
        Self::new(config, Arc::clone(&self.market), Arc::clone(&self.portfolio))
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn market_ledger(&self) -> SharedReturnLedger {
        Arc::clone(&self.market)
    }

    pub fn portfolio_ledger(&self) -> SharedPortfolioLedger {
        Arc::clone(&self.portfolio)
    }

    /// Record a price tick; returns whether it was accepted
    pub fn update_market_data(&self, symbol: &str, price: f64, timestamp: DateTime<Utc>) -> bool {
        self.market.write().record_price(symbol, price, timestamp)
    }

    /// Record a portfolio snapshot stamped now
    pub fn update_portfolio_value(&self, value: f64, positions: BTreeMap<String, f64>) -> bool {
        self.update_portfolio_value_at(value, positions, Utc::now())
    }

    /// Record a portfolio snapshot with an explicit timestamp
    pub fn update_portfolio_value_at(
        &self,
        value: f64,
        positions: BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.portfolio.write().record_portfolio(value, positions, timestamp)
    }

    /// Compute a full report from the current ledger contents
    ///
    /// Never fails: unavailable sections are tagged in the report. Calls are
    /// serialized; a second caller waits for the running computation.
    pub fn calculate_comprehensive_risk_metrics(&self) -> RiskReport {
        let _guard = self.computation.lock();

        let market = self.market.read().snapshot();
        let portfolio = self.portfolio.read().snapshot();

        let report = self.build_report(&market, &portfolio, Utc::now());

        tracing::info!(
            assets = report.asset_metrics.len(),
            alerts = report.alerts.len(),
            risk_level = report.risk_level.as_str(),
            "Risk report computed"
        );

        *self.last_report.write() = Some(report.clone());
        report
    }

    /// Dashboard projection of the last report, computing one if none exists
    pub fn get_risk_dashboard_summary(&self) -> DashboardSummary {
        if let Some(report) = self.last_report.read().as_ref() {
            return report.dashboard_summary();
        }
        self.calculate_comprehensive_risk_metrics().dashboard_summary()
    }

    pub fn last_report(&self) -> Option<RiskReport> {
        self.last_report.read().clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_report.read().as_ref().map(|r| r.timestamp)
    }

    /// Run the computation on the blocking thread pool
    #[cfg(feature = "async")]
    pub async fn calculate_in_background(self: Arc<Self>) -> Result<RiskReport> {
        tokio::task::spawn_blocking(move || self.calculate_comprehensive_risk_metrics())
            .await
            .map_err(|e| TailRiskError::TaskFailed(e.to_string()))
    }

    fn build_report(
        &self,
        market: &MarketHistory,
        portfolio: &PortfolioHistory,
        timestamp: DateTime<Utc>,
    ) -> RiskReport {
        let levels = self.config.reporting_levels();
        let portfolio_value = portfolio
            .latest
            .as_ref()
            .map(|s| s.value)
            .unwrap_or(self.config.portfolio_value);

        let asset_metrics: BTreeMap<String, Section<AssetRiskMetrics>> = market
            .series
            .iter()
            .map(|(symbol, history)| {
                let returns = stats::tail_window(&history.returns, self.config.lookback_periods);
                let section: Section<AssetRiskMetrics> = if returns.len() < self.config.min_observations {
                    tracing::debug!(
                        symbol = %symbol,
                        available = returns.len(),
                        "Skipping asset metrics"
                    );
                    Section::InsufficientData {
                        required: self.config.min_observations,
                        available: returns.len(),
                    }
                } else {
                    self.asset_metrics(symbol, &history.prices, returns, &levels)
                        .into()
                };
                (symbol.clone(), section)
            })
            .collect();

        let portfolio_returns =
            stats::tail_window(&portfolio.returns, self.config.lookback_periods);
        let portfolio_metrics: Section<PortfolioRiskMetrics> = if portfolio_returns.len() < self.config.min_observations {
            Section::InsufficientData {
                required: self.config.min_observations,
                available: portfolio_returns.len(),
            }
        } else {
            self.portfolio_metrics(portfolio, portfolio_returns, portfolio_value, &levels)
                .into()
        };

        let asset_returns: BTreeMap<String, Vec<f64>> = market
            .series
            .iter()
            .map(|(symbol, history)| {
                (
                    symbol.clone(),
                    stats::tail_window(&history.returns, self.config.lookback_periods).to_vec(),
                )
            })
            .collect();

        let correlation_analysis = match self.correlation_analyzer.analyze(&asset_returns) {
            Ok(analysis) => Section::Ok(analysis),
            Err(TailRiskError::InsufficientData(reason)) => {
                tracing::debug!(reason = %reason, "Skipping correlation analysis");
                let available = asset_returns
                    .values()
                    .filter(|r| r.len() >= self.config.min_observations)
                    .count();
                Section::InsufficientData {
                    required: 2,
                    available,
                }
            }
            Err(e) => Section::CalculationFailed {
                reason: e.to_string(),
            },
        };

        let eligible: BTreeMap<String, Vec<f64>> = asset_returns
            .into_iter()
            .filter(|(_, r)| r.len() >= self.config.min_observations)
            .collect();
        let aligned: Vec<Vec<f64>> = if eligible.is_empty() {
            Vec::new()
        } else {
            let (_, matrix) = CorrelationAnalyzer::align(&eligible);
            matrix
                .column_iter()
                .map(|c| c.iter().copied().collect())
                .collect()
        };
        let stress_tests = self.stress_engine.run_all(&StressInputs {
            portfolio_value,
            portfolio_returns,
            asset_returns: &aligned,
        });

        let alerts = self.alerts(&portfolio_metrics, &correlation_analysis);
        let risk_level = match portfolio_metrics.ok() {
            Some(metrics) => {
                let var_95 = metrics.var(VarMethod::Historical, HEADLINE_CONFIDENCE).unwrap_or(0.0);
                let current_drawdown = metrics
                    .drawdown
                    .ok()
                    .map(|d| d.current_drawdown)
                    .unwrap_or(0.0);
                RiskLevel::classify(var_95, current_drawdown)
            }
            None => RiskLevel::Unknown,
        };

        RiskReport {
            timestamp,
            portfolio_value,
            confidence_levels: levels,
            asset_metrics,
            portfolio_metrics,
            correlation_analysis,
            stress_tests,
            alerts,
            risk_level,
        }
    }

    fn asset_metrics(
        &self,
        symbol: &str,
        prices: &[f64],
        returns: &[f64],
        levels: &[f64],
    ) -> Result<AssetRiskMetrics> {
        let prices = stats::tail_window(prices, self.config.lookback_periods + 1);

        Ok(AssetRiskMetrics {
            symbol: symbol.to_string(),
            observations: returns.len(),
            latest_price: prices.last().copied(),
            moments: stats::moments(returns),
            var: self.var_engine.estimate_all(returns, levels)?,
            cvar: self.cvar_engine.estimate_all(returns, levels)?,
            drawdown: self.drawdown_engine.analyze(prices).into(),
            evt: self.tail_analyzer.analyze_evt(returns),
            tail_metrics: self.tail_analyzer.tail_metrics(returns).into(),
        })
    }

    fn portfolio_metrics(
        &self,
        history: &PortfolioHistory,
        returns: &[f64],
        portfolio_value: f64,
        levels: &[f64],
    ) -> Result<PortfolioRiskMetrics> {
        let var = self.var_engine.estimate_all(returns, levels)?;
        let cvar = self.cvar_engine.estimate_all(returns, levels)?;

        let dollar_risk = levels
            .iter()
            .map(|&c| DollarRisk {
                confidence_level: c,
                var_dollar: find_var(&var, VarMethod::Historical, c).unwrap_or(0.0)
                    * portfolio_value,
                cvar_dollar: find_cvar(&cvar, CvarMethod::Historical, c)
                    .unwrap_or(0.0)
                    * portfolio_value,
            })
            .collect();

        let values = stats::tail_window(&history.values, self.config.lookback_periods + 1);
        let var_backtest = self
            .var_engine
            .backtest(returns, self.config.min_observations, HEADLINE_CONFIDENCE)
            .ok();

        Ok(PortfolioRiskMetrics {
            observations: returns.len(),
            portfolio_value,
            moments: stats::moments(returns),
            var,
            cvar,
            dollar_risk,
            drawdown: self.drawdown_engine.analyze_portfolio(values).into(),
            evt: self.tail_analyzer.analyze_evt(returns),
            tail_metrics: self.tail_analyzer.tail_metrics(returns).into(),
            concentration_hhi: history
                .latest
                .as_ref()
                .and_then(|s| concentration_hhi(&s.positions)),
            var_backtest,
        })
    }

    fn alerts(
        &self,
        portfolio: &Section<PortfolioRiskMetrics>,
        correlation: &Section<CorrelationAnalysis>,
    ) -> Vec<RiskAlert> {
        let thresholds = &self.config.alert_thresholds;
        let mut alerts = Vec::new();

        if let Some(metrics) = portfolio.ok() {
            if let Some(var_95) = metrics.var(VarMethod::Historical, HEADLINE_CONFIDENCE) {
                if var_95 > thresholds.var_95 {
                    alerts.push(RiskAlert {
                        kind: AlertKind::HighVar,
                        severity: severity(var_95, thresholds.var_95),
                        message: format!(
                            "Portfolio 95% VaR {:.2}% exceeds {:.2}%",
                            var_95 * 100.0,
                            thresholds.var_95 * 100.0
                        ),
                        value: var_95,
                        threshold: thresholds.var_95,
                    });
                }
            }

            if let Some(drawdown) = metrics.drawdown.ok() {
                let depth = -drawdown.current_drawdown;
                if depth > thresholds.drawdown {
                    alerts.push(RiskAlert {
                        kind: AlertKind::DeepDrawdown,
                        severity: severity(depth, thresholds.drawdown),
                        message: format!(
                            "Current drawdown {:.2}% is beyond -{:.2}%",
                            drawdown.current_drawdown * 100.0,
                            thresholds.drawdown * 100.0
                        ),
                        value: drawdown.current_drawdown,
                        threshold: -thresholds.drawdown,
                    });
                }
            }
        }

        if let Some(average) = correlation.ok().and_then(|a| a.average_correlation) {
            if average > thresholds.correlation {
                alerts.push(RiskAlert {
                    kind: AlertKind::HighCorrelation,
                    severity: AlertSeverity::Warning,
                    message: format!(
                        "Average correlation {:.2} exceeds {:.2}",
                        average, thresholds.correlation
                    ),
                    value: average,
                    threshold: thresholds.correlation,
                });
            }
        }

        for alert in &alerts {
            tracing::warn!(kind = ?alert.kind, value = alert.value, "{}", alert.message);
        }
        alerts
    }
}

/// Critical once the value is twice the threshold
fn severity(value: f64, threshold: f64) -> AlertSeverity {
    if value > 2.0 * threshold {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}

/// Herfindahl-Hirschman index of absolute position weights
fn concentration_hhi(positions: &BTreeMap<String, f64>) -> Option<f64> {
    let gross: f64 = positions.values().map(|v| v.abs()).sum();
    if positions.is_empty() || !(gross.is_finite() && gross > 0.0) {
        return None;
    }
    Some(
        positions
            .values()
            .map(|v| {
                let w = v.abs() / gross;
                w * w
            })
            .sum(),
    )
}
