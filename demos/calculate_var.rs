//! VaR calculation example
//!
//! Compares the six VaR methodologies and their expected shortfall on one
//! return sample.
//!
//! Run with: cargo run --example calculate_var

use tail_risk::stats;
use tail_risk::*;

fn main() -> Result<()> {
    init_tracing();
    println!("=== Value at Risk (VaR) Calculation Example ===\n");

    // 1. Sample returns: 500 periods with a fat left tail
    let returns: Vec<f64> = (0..500)
        .map(|i| {
            let base_return = (i as f64 * 0.1).sin() * 0.01;
            let noise = ((i * 17) % 100) as f64 / 100.0 * 0.005;
            let crash = if i % 41 == 0 { -0.04 } else { 0.0 };
            base_return + noise - 0.0025 + crash
        })
        .collect();

    let moments = stats::moments(&returns);
    println!("Sample returns statistics:");
    println!("  Mean return: {:.4}%", moments.mean * 100.0);
    println!("  Std deviation: {:.4}%", moments.std_dev * 100.0);
    println!("  Skewness: {:.3}", moments.skewness);
    println!("  Excess kurtosis: {:.3}", moments.excess_kurtosis);
    println!("  Number of observations: {}", returns.len());
    println!();

    // 2. Engines
    let var_engine = VarEngine::new(VarConfig {
        random_seed: Some(42),
        ..VarConfig::default()
    });
    let cvar_engine = CvarEngine::new(var_engine.clone());

    let portfolio_value = 1_000_000.0;
    let confidence_level = 0.99;

    // 3. Compare all methods
    println!("--- VaR Methods at {}% ---", confidence_level * 100.0);
    println!("{:<20} {:>10} {:>14}  {}", "Method", "VaR %", "VaR $", "Note");
    println!("{:-<60}", "");
    for method in VarMethod::ALL {
        let estimate = var_engine.estimate(method, &returns, confidence_level)?;
        println!(
            "{:<20} {:>9.3}% {:>14.2}  {}",
            method.name(),
            estimate.value * 100.0,
            estimate.value * portfolio_value,
            match &estimate.fallback {
                Some(reason) => format!("fallback: {:?}", reason),
                None => String::new(),
            }
        );
    }
    println!();

    // 4. Expected shortfall
    println!("--- Conditional VaR (Expected Shortfall) ---");
    for method in CvarMethod::ALL {
        let estimate = cvar_engine.estimate(method, &returns, confidence_level)?;
        println!("{:<22} {:>9.3}%", method.name(), estimate.value * 100.0);
    }
    println!();

    // 5. Multiple confidence levels
    println!("--- Historical VaR at Different Confidence Levels ---");
    for &c in &[0.90, 0.95, 0.99, 0.995] {
        let var = var_engine.historical(&returns, c)?;
        println!(
            "{}% VaR: {:>8.3}% ({:.1}% chance of exceeding)",
            c * 100.0,
            var * 100.0,
            (1.0 - c) * 100.0
        );
    }
    println!();

    // 6. Tail model
    let evt = TailAnalyzer::default().analyze_evt(&returns);
    println!("--- Extreme Value Tail ---");
    println!("Exceedances: {} over threshold {:.4}", evt.exceedances, evt.threshold);
    if let (Some(shape), Some(q)) = (evt.shape, evt.extreme_quantile) {
        println!("GPD shape: {:.3}", shape);
        println!("99.9% loss quantile: {:.3}%", q * 100.0);
    }
    println!();

    // 7. Backtesting
    println!("--- VaR Backtesting Example ---");
    let backtest = var_engine.backtest(&returns, 250, 0.95)?;
    println!("Predictions: {}", backtest.num_predictions);
    println!("Violations: {}", backtest.num_violations);
    println!("Violation Rate: {:.1}%", backtest.violation_rate * 100.0);
    println!("Expected Rate: {:.1}%", backtest.expected_violation_rate * 100.0);
    println!("Validated: {}", if backtest.validated { "PASS" } else { "FAIL" });

    println!("\n=== Example Complete ===");

    Ok(())
}
