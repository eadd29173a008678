//! # tail-risk: Tail Risk Analytics Engine
//!
//! Extreme-event risk metrics for a portfolio of tradable assets, computed
//! over bounded price and portfolio-value histories.
//!
//! ## Core Components
//!
//! - **Ledgers**: bounded per-symbol price/return and portfolio histories
//! - **VarEngine**: historical, parametric normal, Student-t, Monte Carlo,
//!   extreme value and Cornish-Fisher VaR with a historical fallback
//! - **CvarEngine**: expected shortfall paired with each VaR method
//! - **DrawdownEngine**: drawdown series, period segmentation, recovery estimate
//! - **TailAnalyzer**: GPD peaks-over-threshold fit and tail ratios
//! - **CorrelationAnalyzer**: correlation matrix, tail correlation, diversification ratio
//! - **StressTestEngine**: market shock, volatility and correlation scenarios
//! - **RiskAggregator**: composes everything into a [`RiskReport`]
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use std::collections::BTreeMap;
//! use tail_risk::{RiskAggregator, RiskConfig};
//!
//! let yaml = r#"
//! confidence_levels: [0.95, 0.99]
//! random_seed: 7
//! stress_scenarios:
//!   severe_crash:
//!     type: market_shock
//!     shock: -0.30
//! "#;
//!
//! let config = RiskConfig::from_yaml(yaml).unwrap();
//! let aggregator = RiskAggregator::with_config(config).unwrap();
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! for i in 0..60 {
//!     let price = 100.0 + ((i * 7 % 11) as f64 - 5.0);
//!     aggregator.update_market_data("BTC", price, start + Duration::hours(i));
//!     aggregator.update_portfolio_value_at(1_000_000.0 * price / 100.0, BTreeMap::new(), start + Duration::hours(i));
//! }
//!
//! let report = aggregator.calculate_comprehensive_risk_metrics();
//! assert!(report.asset_metrics["BTC"].is_ok());
//! assert_eq!(report.stress_tests.worst_scenario.as_deref(), Some("severe_crash"));
//! ```

pub mod aggregator;
pub mod config;
pub mod correlation;
pub mod cvar;
pub mod drawdown;
pub mod error;
pub mod fit;
pub mod ledger;
pub mod report;
pub mod stats;
pub mod stress;
pub mod tail;
pub mod var;

// Re-export main types
pub use aggregator::RiskAggregator;
pub use config::{AlertThresholds, RiskConfig, StressScenarioConfig};
pub use correlation::{CorrelationAnalysis, CorrelationAnalyzer, TailCorrelation};
pub use cvar::{CvarEngine, CvarEstimate, CvarMethod};
pub use drawdown::{DrawdownAnalysis, DrawdownEngine, DrawdownPeriod};
pub use error::{Result, TailRiskError};
pub use ledger::{
    PortfolioLedger, PortfolioSnapshot, PriceObservation, ReturnLedger, ReturnObservation,
    SharedPortfolioLedger, SharedReturnLedger, PORTFOLIO_SYMBOL,
};
pub use report::{
    AlertKind, AlertSeverity, AssetRiskMetrics, DashboardSummary, PortfolioRiskMetrics,
    RiskAlert, RiskLevel, RiskReport, Section,
};
pub use stress::{ScenarioOutcome, StressTestEngine, StressTestReport};
pub use tail::{EvtAnalysis, TailAnalyzer, TailMetrics};
pub use var::{FallbackReason, VarConfig, VarEngine, VarEstimate, VarMethod};

/// Initialize tracing subscriber for logging
///
/// Filter comes from `RUST_LOG`. Does nothing if a global subscriber is
/// already installed.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}
