//! Benchmarks for the tail risk estimators
//!
//! Run with: cargo bench

use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use tail_risk::*;

fn main() {
    println!("=== Tail Risk Engine Performance Benchmarks ===\n");

    benchmark_var_calculations();
    benchmark_fits();
    benchmark_correlation();
    benchmark_full_report();
}

fn sample_returns(n: usize, phase: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let base = ((i + phase) as f64 * 0.37).sin() * 0.015;
            if (i + phase) % 53 == 0 {
                base - 0.05
            } else {
                base
            }
        })
        .collect()
}

fn benchmark_var_calculations() {
    println!("## VaR Calculations");

    let returns = sample_returns(1000, 0);
    let engine = VarEngine::new(VarConfig {
        random_seed: Some(42),
        ..VarConfig::default()
    });

    for method in VarMethod::ALL {
        let iterations = match method {
            VarMethod::MonteCarlo | VarMethod::ParametricT | VarMethod::ExtremeValue => 10,
            _ => 1000,
        };

        let start = std::time::Instant::now();
        for _ in 0..iterations {
            let _ = engine.estimate(method, &returns, 0.99);
        }
        let elapsed = start.elapsed();
        println!("  {} VaR ({} iterations): {:?}", method.name(), iterations, elapsed);
        println!("  Average: {:?}", elapsed / iterations);
    }

    println!();
}

fn benchmark_fits() {
    println!("## Distribution Fits");

    let returns = sample_returns(1000, 5);

    let start = std::time::Instant::now();
    let _ = fit::fit_student_t(&returns);
    println!("  Student-t MLE (1000 points): {:?}", start.elapsed());

    let analyzer = TailAnalyzer::default();
    let start = std::time::Instant::now();
    let _ = analyzer.analyze_evt(&returns);
    println!("  GPD peaks-over-threshold: {:?}", start.elapsed());

    println!();
}

fn benchmark_correlation() {
    println!("## Correlation Analysis");

    let returns: BTreeMap<String, Vec<f64>> = (0..10)
        .map(|k| (format!("ASSET{}", k), sample_returns(1000, k * 11)))
        .collect();
    let analyzer = CorrelationAnalyzer::default();

    let start = std::time::Instant::now();
    for _ in 0..10 {
        let _ = analyzer.analyze(&returns);
    }
    let elapsed = start.elapsed();
    println!("  10 assets x 1000 returns (10 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10);

    println!();
}

fn benchmark_full_report() {
    println!("## Full Report");

    let aggregator = RiskAggregator::with_config(RiskConfig {
        random_seed: Some(42),
        ..RiskConfig::default()
    })
    .expect("default config is valid");

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut prices = [100.0, 50.0, 10.0];
    for i in 0..1000 {
        let ts = t0 + Duration::minutes(i);
        let mut total = 0.0;
        for (k, price) in prices.iter_mut().enumerate() {
            *price *= 1.0 + sample_returns(1, i as usize + k * 7)[0];
            aggregator.update_market_data(&format!("ASSET{}", k), *price, ts);
            total += *price * 1000.0;
        }
        aggregator.update_portfolio_value_at(total, BTreeMap::new(), ts);
    }

    let start = std::time::Instant::now();
    let report = aggregator.calculate_comprehensive_risk_metrics();
    println!("  3 assets, 1000 observations: {:?}", start.elapsed());
    println!("  Risk level: {}", report.risk_level.as_str());

    println!();
}
