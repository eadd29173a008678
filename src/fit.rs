//! Maximum-likelihood fits for heavy-tailed distributions
//!
//! - Student-t (degrees of freedom, location, scale) for parametric-t VaR
//! - Generalized Pareto (shape, scale, location fixed at zero) for threshold
//!   exceedances in peaks-over-threshold EVT
//!
//! Both fits minimise the negative log-likelihood with a bounded Nelder-Mead
//! simplex search. A fit that cannot start (too few points, zero variance) or
//! ends on a non-finite likelihood returns `TailRiskError::FitFailure`.

use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use crate::error::{Result, TailRiskError};
use crate::stats;

/// Shape values closer to zero than this use the exponential limit
pub const GPD_SHAPE_EPSILON: f64 = 1e-9;

/// Fitted Student-t parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudentTFit {
    pub dof: f64,
    pub location: f64,
    pub scale: f64,
    pub log_likelihood: f64,
}

/// Fitted Generalized Pareto parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpdFit {
    /// Shape ξ (positive = heavy tail)
    pub shape: f64,
    /// Scale β
    pub scale: f64,
    pub log_likelihood: f64,
}

impl GpdFit {
    /// Loss quantile implied by the fit above `threshold`
    ///
    /// `n` is the full sample size and `exceedances` the number of points
    /// above the threshold.
    pub fn tail_quantile(
        &self,
        threshold: f64,
        n: usize,
        exceedances: usize,
        confidence_level: f64,
    ) -> f64 {
        let ratio = n as f64 / exceedances as f64 * (1.0 - confidence_level);
        if self.shape.abs() < GPD_SHAPE_EPSILON {
            threshold - self.scale * ratio.ln()
        } else {
            threshold + self.scale / self.shape * (ratio.powf(-self.shape) - 1.0)
        }
    }
}

/// Nelder-Mead tuning
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub initial_step: f64,
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 600,
            tolerance: 1e-10,
            initial_step: 0.05,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
        }
    }
}

/// Minimiser output
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Bounded Nelder-Mead simplex search
///
/// Every trial point is clamped into `[lower, upper]`. The objective may
/// return `f64::INFINITY` for infeasible points.
pub fn nelder_mead<F>(
    initial: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: NelderMeadOptions,
    mut objective: F,
) -> Result<Minimum>
where
    F: FnMut(&[f64]) -> f64,
{
    let dim = initial.len();
    if dim == 0 || lower.len() != dim || upper.len() != dim {
        return Err(TailRiskError::InvalidParameter(
            "Nelder-Mead bounds do not match the initial point".to_string(),
        ));
    }

    let clamp = |x: &[f64]| -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(d, v)| v.clamp(lower[d], upper[d]))
            .collect()
    };

    let x0 = clamp(initial);
    let mut simplex = vec![x0.clone()];
    let mut values = vec![objective(&x0)];

    for d in 0..dim {
        let mut x = x0.clone();
        let step = (upper[d] - lower[d]).abs() * options.initial_step.max(1e-4);
        x[d] = (x[d] + step).min(upper[d]);
        if (x[d] - x0[d]).abs() < 1e-14 {
            x[d] = (x[d] - step).max(lower[d]);
        }
        values.push(objective(&x));
        simplex.push(x);
    }

    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let centroid: Vec<f64> = (0..dim)
            .map(|d| simplex.iter().take(dim).map(|x| x[d]).sum::<f64>() / dim as f64)
            .collect();

        let spread = (values[dim] - values[0]).abs();
        let max_vertex_dist = simplex
            .iter()
            .map(|x| {
                x.iter()
                    .zip(&centroid)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
            })
            .fold(0.0_f64, f64::max);

        if spread <= options.tolerance && max_vertex_dist <= options.tolerance.sqrt() {
            converged = true;
            break;
        }

        let toward = |coef: f64, from: &[f64]| -> Vec<f64> {
            clamp(
                &(0..dim)
                    .map(|d| centroid[d] + coef * (from[d] - centroid[d]))
                    .collect::<Vec<_>>(),
            )
        };

        let xr = toward(-options.reflection, &simplex[dim]);
        let fr = objective(&xr);

        if fr < values[0] {
            let xe = toward(options.expansion, &xr);
            let fe = objective(&xe);
            if fe < fr {
                simplex[dim] = xe;
                values[dim] = fe;
            } else {
                simplex[dim] = xr;
                values[dim] = fr;
            }
            continue;
        }

        if fr < values[dim - 1] {
            simplex[dim] = xr;
            values[dim] = fr;
            continue;
        }

        let xc = toward(options.contraction, &simplex[dim]);
        let fc = objective(&xc);
        if fc < values[dim] {
            simplex[dim] = xc;
            values[dim] = fc;
            continue;
        }

        for i in 1..=dim {
            let shrunk: Vec<f64> = (0..dim)
                .map(|d| simplex[0][d] + options.shrink * (simplex[i][d] - simplex[0][d]))
                .collect();
            simplex[i] = clamp(&shrunk);
            values[i] = objective(&simplex[i]);
        }
    }

    let best = (0..values.len())
        .min_by(|&i, &j| values[i].total_cmp(&values[j]))
        .unwrap_or(0);

    Ok(Minimum {
        x: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    })
}

/// Student-t log-likelihood of `sample`
fn student_t_log_likelihood(sample: &[f64], dof: f64, location: f64, scale: f64) -> f64 {
    if !(dof > 0.0 && scale > 0.0) {
        return f64::NEG_INFINITY;
    }
    let n = sample.len() as f64;
    let constant = ln_gamma((dof + 1.0) / 2.0)
        - ln_gamma(dof / 2.0)
        - 0.5 * (dof * std::f64::consts::PI).ln()
        - scale.ln();
    let kernel: f64 = sample
        .iter()
        .map(|x| {
            let z = (x - location) / scale;
            (1.0 + z * z / dof).ln()
        })
        .sum();
    n * constant - (dof + 1.0) / 2.0 * kernel
}

/// Fit a Student-t distribution by maximum likelihood
pub fn fit_student_t(sample: &[f64]) -> Result<StudentTFit> {
    if sample.len() < 4 {
        return Err(TailRiskError::FitFailure(format!(
            "Student-t fit needs at least 4 observations, got {}",
            sample.len()
        )));
    }

    let m = stats::moments(sample);
    if m.std_dev <= 1e-12 || !m.std_dev.is_finite() {
        return Err(TailRiskError::FitFailure(
            "Student-t fit on a zero-variance sample".to_string(),
        ));
    }

    let dof0 = if m.excess_kurtosis > 0.0 {
        (4.0 + 6.0 / m.excess_kurtosis).clamp(2.5, 100.0)
    } else {
        30.0
    };
    let scale0 = m.std_dev * ((dof0 - 2.0) / dof0).sqrt();
    let loc0 = stats::median(sample)?;

    let initial = [dof0.ln(), loc0, scale0.ln()];
    let lower = [
        0.2_f64.ln(),
        m.mean - 10.0 * m.std_dev,
        (m.std_dev * 1e-4).ln(),
    ];
    let upper = [
        500.0_f64.ln(),
        m.mean + 10.0 * m.std_dev,
        (m.std_dev * 10.0).ln(),
    ];

    let minimum = nelder_mead(&initial, &lower, &upper, NelderMeadOptions::default(), |x| {
        let ll = student_t_log_likelihood(sample, x[0].exp(), x[1], x[2].exp());
        if ll.is_finite() {
            -ll
        } else {
            f64::INFINITY
        }
    })?;

    if !minimum.value.is_finite() {
        return Err(TailRiskError::FitFailure(
            "Student-t likelihood did not reach a finite optimum".to_string(),
        ));
    }
    if !minimum.converged {
        tracing::debug!(
            iterations = minimum.iterations,
            "Student-t fit stopped at the iteration limit"
        );
    }

    Ok(StudentTFit {
        dof: minimum.x[0].exp(),
        location: minimum.x[1],
        scale: minimum.x[2].exp(),
        log_likelihood: -minimum.value,
    })
}

/// GPD log-likelihood of positive exceedances
fn gpd_log_likelihood(exceedances: &[f64], shape: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let n = exceedances.len() as f64;

    if shape.abs() < GPD_SHAPE_EPSILON {
        return -n * scale.ln() - exceedances.iter().sum::<f64>() / scale;
    }

    let mut kernel = 0.0;
    for &y in exceedances {
        let t = 1.0 + shape * y / scale;
        if t <= 0.0 {
            return f64::NEG_INFINITY;
        }
        kernel += t.ln();
    }
    -n * scale.ln() - (1.0 + 1.0 / shape) * kernel
}

/// Fit a Generalized Pareto distribution to threshold exceedances
///
/// Location is fixed at zero; exceedances must be positive.
pub fn fit_gpd(exceedances: &[f64]) -> Result<GpdFit> {
    if exceedances.len() < 2 {
        return Err(TailRiskError::FitFailure(format!(
            "GPD fit needs at least 2 exceedances, got {}",
            exceedances.len()
        )));
    }
    if exceedances.iter().any(|y| !(y.is_finite() && *y > 0.0)) {
        return Err(TailRiskError::FitFailure(
            "GPD exceedances must be positive and finite".to_string(),
        ));
    }

    // Method-of-moments start
    let mean = stats::mean(exceedances);
    let var = stats::std_dev(exceedances).powi(2);
    let (mut shape0, scale0) = if var > 1e-20 {
        let r = mean * mean / var;
        (0.5 * (1.0 - r), 0.5 * mean * (r + 1.0))
    } else {
        (0.0, mean)
    };
    shape0 = shape0.clamp(-0.45, 1.5);
    let max_y = exceedances.iter().copied().fold(0.0_f64, f64::max);
    if shape0 < 0.0 && 1.0 + shape0 * max_y / scale0 <= 0.0 {
        shape0 = 0.0;
    }

    let initial = [shape0, scale0.ln()];
    let lower = [-0.5, (mean * 1e-3).ln()];
    let upper = [3.0, (mean * 1e3).ln()];

    let minimum = nelder_mead(&initial, &lower, &upper, NelderMeadOptions::default(), |x| {
        let ll = gpd_log_likelihood(exceedances, x[0], x[1].exp());
        if ll.is_finite() {
            -ll
        } else {
            f64::INFINITY
        }
    })?;

    if !minimum.value.is_finite() {
        return Err(TailRiskError::FitFailure(
            "GPD likelihood did not reach a finite optimum".to_string(),
        ));
    }
    if !minimum.converged {
        tracing::debug!(
            iterations = minimum.iterations,
            "GPD fit stopped at the iteration limit"
        );
    }

    Ok(GpdFit {
        shape: minimum.x[0],
        scale: minimum.x[1].exp(),
        log_likelihood: -minimum.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Exp, StudentT};

    #[test]
    fn test_nelder_mead_quadratic() {
        let min = nelder_mead(
            &[4.0, -4.0],
            &[-5.0, -5.0],
            &[5.0, 5.0],
            NelderMeadOptions::default(),
            |x| (x[0] - 1.5).powi(2) + (x[1] + 2.0).powi(2),
        )
        .unwrap();

        assert!((min.x[0] - 1.5).abs() < 1e-3);
        assert!((min.x[1] + 2.0).abs() < 1e-3);
        assert!(min.converged);
        assert!(min.iterations < NelderMeadOptions::default().max_iterations);
    }

    #[test]
    fn test_nelder_mead_respects_bounds() {
        let min = nelder_mead(
            &[0.5],
            &[0.0],
            &[1.0],
            NelderMeadOptions::default(),
            |x| (x[0] - 3.0).powi(2),
        )
        .unwrap();
        assert!(min.x[0] <= 1.0);
        assert!((min.x[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_student_t_recovers_heavy_tails() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let dist = StudentT::new(4.0).unwrap();
        let sample: Vec<f64> = (0..3000).map(|_| 0.01 * dist.sample(&mut rng)).collect();

        let fit = fit_student_t(&sample).unwrap();
        assert!(fit.dof > 2.0 && fit.dof < 10.0, "dof = {}", fit.dof);
        assert!(fit.location.abs() < 0.002);
        assert!((fit.scale - 0.01).abs() < 0.002, "scale = {}", fit.scale);
    }

    #[test]
    fn test_student_t_rejects_constant_sample() {
        let result = fit_student_t(&[0.0; 50]);
        assert!(matches!(result, Err(TailRiskError::FitFailure(_))));
    }

    #[test]
    fn test_gpd_exponential_has_near_zero_shape() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let dist = Exp::new(50.0).unwrap();
        let sample: Vec<f64> = (0..4000).map(|_| dist.sample(&mut rng)).collect();

        let fit = fit_gpd(&sample).unwrap();
        assert!(fit.shape.abs() < 0.1, "shape = {}", fit.shape);
        assert!((fit.scale - 0.02).abs() < 0.003, "scale = {}", fit.scale);
    }

    #[test]
    fn test_gpd_rejects_bad_input() {
        assert!(fit_gpd(&[0.1]).is_err());
        assert!(fit_gpd(&[0.1, -0.2, 0.3]).is_err());
    }

    #[test]
    fn test_tail_quantile_is_continuous_in_shape() {
        let exponential = GpdFit {
            shape: 0.0,
            scale: 0.02,
            log_likelihood: 0.0,
        };
        let tiny = GpdFit {
            shape: 1e-6,
            ..exponential
        };
        let a = exponential.tail_quantile(0.03, 1000, 100, 0.99);
        let b = tiny.tail_quantile(0.03, 1000, 100, 0.99);
        assert!((a - b).abs() < 1e-6);
        assert!(a > 0.03);
    }
}
