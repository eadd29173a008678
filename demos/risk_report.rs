//! Comprehensive risk report example
//!
//! Loads the sample configuration, feeds simulated prices and portfolio
//! snapshots into the aggregator and prints the report and dashboard.
//!
//! Run with: cargo run --example risk_report

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use tail_risk::*;

fn main() -> Result<()> {
    init_tracing();
    println!("=== Tail Risk Report Example ===\n");

    let config_path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/risk_config.yaml");
    let config = RiskConfig::from_yaml_file(config_path)?;
    let aggregator = RiskAggregator::with_config(config)?;

    // 1. Simulated market: three assets, 400 hourly ticks
    let holdings = [("SPY", 450.0, 500.0), ("QQQ", 380.0, 300.0), ("TLT", 95.0, 1200.0)];
    let mut prices: Vec<f64> = holdings.iter().map(|(_, p, _)| *p).collect();
    let t0 = Utc::now() - Duration::hours(400);

    for i in 0..400usize {
        let ts = t0 + Duration::hours(i as i64);
        let market = ((i * 7919) % 1009) as f64 / 1009.0 - 0.5;
        let crash = if i % 97 == 0 { -0.04 } else { 0.0 };

        let mut positions = BTreeMap::new();
        for (k, (symbol, _, quantity)) in holdings.iter().enumerate() {
            let idio = (((i + 13 * k) * 104_729) % 997) as f64 / 997.0 - 0.5;
            // bonds move against equities
            let beta = if *symbol == "TLT" { -0.4 } else { 1.0 };
            prices[k] *= 1.0 + beta * (market * 0.02 + crash) + idio * 0.01;
            aggregator.update_market_data(symbol, prices[k], ts);
            positions.insert(symbol.to_string(), prices[k] * quantity);
        }
        let total: f64 = positions.values().sum();
        aggregator.update_portfolio_value_at(total, positions, ts);
    }

    // 2. Full report
    let report = aggregator.calculate_comprehensive_risk_metrics();

    println!("Portfolio value: ${:.2}", report.portfolio_value);
    println!("Risk level: {}", report.risk_level.as_str());
    println!();

    println!("--- Asset Metrics ---");
    for (symbol, section) in &report.asset_metrics {
        match section.ok() {
            Some(m) => println!(
                "{:<5} VaR95 {:>6.2}%  CVaR95 {:>6.2}%  MaxDD {:>7.2}%",
                symbol,
                m.var(VarMethod::Historical, 0.95).unwrap_or(0.0) * 100.0,
                m.cvar(CvarMethod::Historical, 0.95).unwrap_or(0.0) * 100.0,
                m.drawdown.ok().map(|d| d.max_drawdown * 100.0).unwrap_or(0.0),
            ),
            None => println!("{:<5} {}", symbol, section.status()),
        }
    }
    println!();

    if let Some(corr) = report.correlation_analysis.ok() {
        println!("--- Correlation ---");
        if let Some(average) = corr.average_correlation {
            println!("Average correlation: {:.3}", average);
        }
        if let Some((first, second)) = &corr.most_correlated_pair {
            println!("Most correlated: {} / {}", first, second);
        }
        if let Some(ratio) = corr.diversification_ratio {
            println!("Diversification ratio: {:.3}", ratio);
        }
        println!();
    }

    println!("--- Stress Tests ---");
    for (name, outcome) in &report.stress_tests.scenarios {
        match outcome.loss_amount() {
            Some(loss) => println!("{:<22} loss ${:>12.2}", name, loss),
            None => println!("{:<22} {:?}", name, outcome),
        }
    }
    if let Some(worst) = &report.stress_tests.worst_scenario {
        println!("Worst scenario: {} (${:.2})", worst, report.stress_tests.max_loss);
    }
    println!();

    println!("--- Alerts ---");
    if report.alerts.is_empty() {
        println!("No active alerts");
    }
    for alert in &report.alerts {
        println!("[{:?}] {}", alert.severity, alert.message);
    }
    println!();

    // 3. Dashboard projection
    let summary = aggregator.get_risk_dashboard_summary();
    println!("--- Dashboard ---");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    println!("\n=== Example Complete ===");

    Ok(())
}
