//! Property-based tests for the estimators

use proptest::prelude::*;
use tail_risk::{CvarEngine, DrawdownEngine, VarEngine};

proptest! {
    #[test]
    fn prop_historical_var_monotone_in_confidence(
        returns in prop::collection::vec(-0.5f64..0.5, 1..300)
    ) {
        let engine = VarEngine::default();
        let var_95 = engine.historical(&returns, 0.95).unwrap();
        let var_99 = engine.historical(&returns, 0.99).unwrap();
        prop_assert!(var_99 >= var_95);
    }

    #[test]
    fn prop_cvar_not_below_var(
        returns in prop::collection::vec(-0.5f64..0.5, 1..300),
        confidence in 0.5f64..0.999
    ) {
        let var = VarEngine::default().historical(&returns, confidence).unwrap();
        let cvar = CvarEngine::default().historical(&returns, confidence).unwrap();
        prop_assert!(cvar >= var, "cvar {} < var {}", cvar, var);
    }

    #[test]
    fn prop_drawdown_bounded(
        prices in prop::collection::vec(0.01f64..1e6, 1..300)
    ) {
        let drawdowns = DrawdownEngine::drawdown_series(&prices).unwrap();
        prop_assert_eq!(drawdowns.len(), prices.len());
        for d in drawdowns {
            prop_assert!((-1.0..=0.0).contains(&d));
        }
    }

    #[test]
    fn prop_max_drawdown_is_series_minimum(
        prices in prop::collection::vec(1.0f64..1000.0, 2..200)
    ) {
        let analysis = DrawdownEngine::default().analyze(&prices).unwrap();
        prop_assert!(analysis.max_drawdown <= analysis.current_drawdown);
        prop_assert!(analysis.time_underwater_pct >= 0.0 && analysis.time_underwater_pct <= 100.0);
        prop_assert_eq!(analysis.periods.count, analysis.periods.periods.len());
    }
}
