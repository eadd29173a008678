//! Integration tests for the tail risk engine
//!
//! These tests drive the aggregator end to end: configuration loading,
//! ledger ingestion, report computation and the documented edge cases.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tail_risk::stats;
use tail_risk::{
    FallbackReason, RiskAggregator, RiskConfig, RiskLevel, ScenarioOutcome, Section, VarEngine,
    VarMethod,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn load_config() -> RiskConfig {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/risk_config.yaml");
    RiskConfig::from_yaml_file(path).expect("Failed to load risk config")
}

/// Deterministic pseudo-random walk with occasional shocks
fn price_path(n: usize, seed: usize, base: f64) -> Vec<f64> {
    let mut price = base;
    (0..n)
        .map(|i| {
            let u = ((i * 7919 + seed * 104_729) % 1009) as f64 / 1009.0 - 0.5;
            let shock = if (i + seed) % 37 == 0 { -0.06 } else { 0.0 };
            price *= 1.0 + u * 0.03 + shock;
            price
        })
        .collect()
}

fn populate(aggregator: &RiskAggregator, n: usize) {
    let symbols = [("BTC", 1, 40_000.0), ("ETH", 2, 2_500.0), ("SOL", 3, 100.0)];
    let paths: Vec<Vec<f64>> = symbols
        .iter()
        .map(|(_, seed, base)| price_path(n, *seed, *base))
        .collect();

    for i in 0..n {
        let ts = start() + Duration::hours(i as i64);
        let mut positions = BTreeMap::new();
        let mut total = 0.0;
        for ((symbol, _, base), path) in symbols.iter().zip(&paths) {
            assert!(aggregator.update_market_data(symbol, path[i], ts));
            let value = 300_000.0 * path[i] / base;
            positions.insert(symbol.to_string(), value);
            total += value;
        }
        assert!(aggregator.update_portfolio_value_at(total, positions, ts));
    }
}

#[test]
fn test_load_example_config() {
    let config = load_config();
    assert_eq!(config.confidence_levels, vec![0.95, 0.99, 0.995]);
    assert_eq!(config.random_seed, Some(42));
    assert_eq!(config.stress_scenarios.len(), 7);
}

#[test]
fn test_end_to_end_report() {
    let aggregator = RiskAggregator::with_config(load_config()).unwrap();
    populate(&aggregator, 300);

    let report = aggregator.calculate_comprehensive_risk_metrics();

    assert_eq!(report.asset_metrics.len(), 3);
    for (symbol, section) in &report.asset_metrics {
        let metrics = section.ok().unwrap_or_else(|| panic!("{} has no metrics", symbol));
        // Lookback window caps the analyzed returns
        assert_eq!(metrics.observations, 252);
        for c in [0.95, 0.99, 0.995] {
            let var = metrics.var(VarMethod::Historical, c).unwrap();
            let cvar = metrics.cvar(tail_risk::CvarMethod::Historical, c).unwrap();
            assert!(cvar >= var);
        }
    }

    let portfolio = report.portfolio_metrics.ok().unwrap();
    assert_eq!(portfolio.observations, 252);
    assert!(portfolio.var_backtest.is_some());
    assert!(portfolio.concentration_hhi.unwrap() > 1.0 / 3.0 - 1e-9);

    let correlation = report.correlation_analysis.ok().unwrap();
    assert_eq!(correlation.symbols, vec!["BTC", "ETH", "SOL"]);
    assert_eq!(correlation.tail_correlations.len(), 3);

    assert!(report.stress_tests.scenarios.contains_key("liquidity_squeeze"));
    assert!(matches!(
        report.stress_tests.scenarios["correlation_breakdown"],
        ScenarioOutcome::CorrelationBreakdown(_)
    ));
    assert_ne!(report.risk_level, RiskLevel::Unknown);

    let json = report.to_json_pretty().unwrap();
    assert!(!json.contains("NaN"));
}

#[test]
fn test_seeded_report_is_idempotent() {
    let aggregator = RiskAggregator::with_config(load_config()).unwrap();
    populate(&aggregator, 120);

    let first = aggregator.calculate_comprehensive_risk_metrics();
    let mut second = aggregator.calculate_comprehensive_risk_metrics();

    second.timestamp = first.timestamp;
    assert_eq!(first, second);
}

#[test]
fn test_report_is_idempotent() {
    let aggregator = RiskAggregator::with_config(RiskConfig::default()).unwrap();
    populate(&aggregator, 80);

    let first = aggregator.calculate_comprehensive_risk_metrics();
    let mut second = aggregator.calculate_comprehensive_risk_metrics();

    let mc_var = |report: &tail_risk::RiskReport| {
        report
            .portfolio_metrics
            .ok()
            .and_then(|p| p.var(VarMethod::MonteCarlo, 0.99))
    };
    assert!(mc_var(&first).is_some());
    assert_eq!(mc_var(&first), mc_var(&second));

    second.timestamp = first.timestamp;
    assert_eq!(first, second);
}

#[test]
fn test_constant_prices() {
    let aggregator = RiskAggregator::with_config(load_config()).unwrap();
    for i in 0..40 {
        let ts = start() + Duration::minutes(i);
        aggregator.update_market_data("FLAT", 25.0, ts);
        aggregator.update_portfolio_value_at(1_000_000.0, BTreeMap::new(), ts);
    }

    let report = aggregator.calculate_comprehensive_risk_metrics();
    let flat = report.asset_metrics["FLAT"].ok().unwrap();

    assert_eq!(flat.moments.std_dev, 0.0);
    for c in [0.95, 0.99] {
        assert_eq!(flat.var(VarMethod::Historical, c), Some(0.0));
        assert_eq!(flat.var(VarMethod::ParametricNormal, c), Some(0.0));
    }
    let drawdown = flat.drawdown.ok().unwrap();
    assert_eq!(drawdown.max_drawdown, 0.0);

    let portfolio = report.portfolio_metrics.ok().unwrap();
    assert_eq!(portfolio.var(VarMethod::Historical, 0.95), Some(0.0));
    assert_eq!(report.risk_level, RiskLevel::VeryLow);
    assert!(report.alerts.is_empty());
}

#[test]
fn test_severe_crash_scenario() {
    let aggregator = RiskAggregator::with_config(load_config()).unwrap();
    aggregator.update_portfolio_value_at(1_000_000.0, BTreeMap::new(), start());

    let report = aggregator.calculate_comprehensive_risk_metrics();
    match &report.stress_tests.scenarios["severe_crash"] {
        ScenarioOutcome::MarketShock(result) => {
            assert_relative_eq!(result.shocked_value, 700_000.0);
            assert_relative_eq!(result.loss_amount, 300_000.0);
            assert_relative_eq!(result.loss_percentage, 30.0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(report.stress_tests.worst_scenario.as_deref(), Some("severe_crash"));
}

#[test]
fn test_repeated_sample_historical_var() {
    let returns: Vec<f64> = [0.01, 0.02, -0.01, 0.03, -0.02]
        .iter()
        .copied()
        .cycle()
        .take(40)
        .collect();

    let var = VarEngine::default().historical(&returns, 0.95).unwrap();
    assert_eq!(var, -stats::percentile(&returns, 5.0).unwrap());
    assert_eq!(var, 0.02);
}

#[test]
fn test_evt_falls_back_with_five_exceedances() {
    let returns: Vec<f64> = (0..50).map(|i| (i as f64 - 25.0) * 0.001).collect();
    let engine = VarEngine::default();

    let historical = engine.historical(&returns, 0.99).unwrap();
    let estimate = engine.estimate(VarMethod::ExtremeValue, &returns, 0.99).unwrap();

    assert_eq!(estimate.value, historical);
    assert_eq!(
        estimate.fallback,
        Some(FallbackReason::InsufficientExceedances {
            found: 5,
            required: 10
        })
    );
}

#[test]
fn test_rejected_inputs_do_not_corrupt_returns() {
    let aggregator = RiskAggregator::with_config(RiskConfig::default()).unwrap();
    assert!(aggregator.update_market_data("BTC", 100.0, start()));
    assert!(!aggregator.update_market_data("BTC", 0.0, start()));
    assert!(!aggregator.update_market_data("BTC", -5.0, start()));
    assert!(aggregator.update_market_data("BTC", 110.0, start()));
    assert!(!aggregator.update_portfolio_value(0.0, BTreeMap::new()));

    let ledger = aggregator.market_ledger();
    let returns = ledger.read().returns("BTC");
    assert_eq!(returns.len(), 1);
    assert_relative_eq!(returns[0], 0.1, epsilon = 1e-12);
}

#[test]
fn test_ingestion_during_computation() {
    let aggregator = Arc::new(RiskAggregator::with_config(load_config()).unwrap());
    populate(&aggregator, 60);

    let writer = {
        let aggregator = Arc::clone(&aggregator);
        std::thread::spawn(move || {
            for i in 0..200 {
                let ts = start() + Duration::days(10) + Duration::seconds(i);
                aggregator.update_market_data("BTC", 40_000.0 + i as f64, ts);
            }
        })
    };

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let aggregator = Arc::clone(&aggregator);
            std::thread::spawn(move || aggregator.calculate_comprehensive_risk_metrics())
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        let report = reader.join().unwrap();
        assert!(matches!(report.asset_metrics["BTC"], Section::Ok(_)));
    }
    assert!(aggregator.last_update().is_some());
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_calculate_in_background() {
    let aggregator = Arc::new(RiskAggregator::with_config(load_config()).unwrap());
    populate(&aggregator, 60);

    let report = Arc::clone(&aggregator).calculate_in_background().await.unwrap();
    assert!(report.portfolio_metrics.is_ok());
    assert_eq!(aggregator.last_update(), Some(report.timestamp));
}
