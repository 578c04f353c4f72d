//! Bounded Nelder-Mead simplex minimization for parameter estimation.

use tracing::debug;

use crate::error::{ForecastError, Result};

/// Result of Nelder-Mead optimization.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub optimal_point: Vec<f64>,
    pub optimal_value: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl NelderMeadResult {
    /// Turn a non-converged or non-finite optimum into a model fit error.
    pub fn require_converged(self, model: &str) -> Result<Self> {
        if !self.optimal_value.is_finite() {
            return Err(ForecastError::model_fit(
                model,
                format!(
                    "objective is not finite at the optimum ({})",
                    self.optimal_value
                ),
            ));
        }
        if !self.converged {
            return Err(ForecastError::model_fit(
                model,
                format!("optimizer did not converge in {} iterations", self.iterations),
            ));
        }
        Ok(self)
    }
}

/// Configuration for Nelder-Mead optimization.
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Iteration cap; the optimizer reports non-convergence when hit.
    pub max_iter: usize,
    /// Relative spread of objective values at which the simplex has converged.
    pub tolerance: f64,
    /// Reflection coefficient.
    pub alpha: f64,
    /// Expansion coefficient.
    pub gamma: f64,
    /// Contraction coefficient.
    pub rho: f64,
    /// Shrinkage coefficient.
    pub sigma: f64,
    /// Initial simplex step, relative to each non-zero coordinate.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            tolerance: 1e-10,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.05,
        }
    }
}

impl NelderMeadConfig {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    point: Vec<f64>,
    value: f64,
}

/// Minimize `objective` starting from `initial`, clamping every trial point to `bounds`.
///
/// NaN objective values rank worst, so a region where the objective is
/// undefined is walked away from rather than adopted.
///
/// ```
/// use visitor_forecast::utils::optimization::{nelder_mead, NelderMeadConfig};
///
/// let result = nelder_mead(
///     |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
///     &[0.0, 0.0],
///     None,
///     &NelderMeadConfig::default(),
/// );
/// assert!(result.converged);
/// assert!((result.optimal_point[0] - 2.0).abs() < 1e-3);
/// ```
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: &NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        return NelderMeadResult {
            optimal_point: vec![],
            optimal_value: f64::NAN,
            iterations: 0,
            converged: false,
        };
    }

    let evaluate = |point: Vec<f64>| -> Vertex {
        let point = clamp(point, bounds);
        let value = objective(&point);
        Vertex {
            value: if value.is_nan() { f64::INFINITY } else { value },
            point,
        }
    };

    let mut simplex: Vec<Vertex> = Vec::with_capacity(n + 1);
    simplex.push(evaluate(initial.to_vec()));
    for i in 0..n {
        let mut point = initial.to_vec();
        point[i] += if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        simplex.push(evaluate(point));
    }

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;
        simplex.sort_by(|a, b| a.value.total_cmp(&b.value));

        let best = simplex[0].value;
        let worst = simplex[n].value;
        if best.is_finite() && worst - best <= config.tolerance * (1.0 + best.abs()) {
            converged = true;
            break;
        }

        let centroid = centroid(&simplex[..n]);
        let diameter = simplex
            .iter()
            .map(|v| distance(&v.point, &centroid))
            .fold(0.0, f64::max);
        if best.is_finite() && diameter < config.tolerance.sqrt() * 1e-3 {
            converged = true;
            break;
        }

        let reflected = evaluate(towards(&centroid, &simplex[n].point, -config.alpha));

        if reflected.value < simplex[0].value {
            let expanded = evaluate(towards(&centroid, &reflected.point, config.gamma));
            simplex[n] = if expanded.value < reflected.value {
                expanded
            } else {
                reflected
            };
            continue;
        }
        if reflected.value < simplex[n - 1].value {
            simplex[n] = reflected;
            continue;
        }

        let contracted = if reflected.value < simplex[n].value {
            let outside = evaluate(towards(&centroid, &reflected.point, config.rho));
            (outside.value <= reflected.value).then_some(outside)
        } else {
            let inside = evaluate(towards(&centroid, &simplex[n].point, config.rho));
            (inside.value < simplex[n].value).then_some(inside)
        };
        if let Some(vertex) = contracted {
            simplex[n] = vertex;
            continue;
        }

        let anchor = simplex[0].point.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let shrunk = towards(&anchor, &vertex.point, config.sigma);
            *vertex = evaluate(shrunk);
        }
    }

    simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
    let best = simplex.swap_remove(0);
    debug!(
        iterations,
        converged,
        value = best.value,
        "nelder-mead finished"
    );

    NelderMeadResult {
        optimal_point: best.point,
        optimal_value: best.value,
        iterations,
        converged,
    }
}

fn centroid(vertices: &[Vertex]) -> Vec<f64> {
    let dim = vertices[0].point.len();
    let mut c = vec![0.0; dim];
    for v in vertices {
        for (ci, x) in c.iter_mut().zip(v.point.iter()) {
            *ci += x;
        }
    }
    for ci in &mut c {
        *ci /= vertices.len() as f64;
    }
    c
}

/// `origin + factor * (point - origin)`; a negative factor reflects.
fn towards(origin: &[f64], point: &[f64], factor: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(point.iter())
        .map(|(o, p)| o + factor * (p - o))
        .collect()
}

fn clamp(point: Vec<f64>, bounds: Option<&[(f64, f64)]>) -> Vec<f64> {
    match bounds {
        None => point,
        Some(b) => point
            .into_iter()
            .enumerate()
            .map(|(i, x)| match b.get(i) {
                Some(&(lo, hi)) => x.clamp(lo, hi),
                None => x,
            })
            .collect(),
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quadratic_2d() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
            &[0.0, 0.0],
            None,
            &NelderMeadConfig::default(),
        );
        assert!(result.converged);
        assert_relative_eq!(result.optimal_point[0], 2.0, epsilon = 1e-3);
        assert_relative_eq!(result.optimal_point[1], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn rosenbrock() {
        let result = nelder_mead(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2),
            &[-1.0, 1.0],
            None,
            &NelderMeadConfig::default().with_max_iter(5000),
        );
        assert_relative_eq!(result.optimal_point[0], 1.0, epsilon = 0.05);
        assert_relative_eq!(result.optimal_point[1], 1.0, epsilon = 0.1);
    }

    #[test]
    fn bounds_are_respected() {
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[0.5],
            Some(&[(0.0, 1.0)]),
            &NelderMeadConfig::default(),
        );
        assert!(result.optimal_point[0] <= 1.0);
        assert_relative_eq!(result.optimal_point[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn large_objective_converges_relatively() {
        let result = nelder_mead(
            |x| 1e9 + (x[0] - 0.3).powi(2) * 1e6,
            &[0.9],
            Some(&[(0.0, 1.0)]),
            &NelderMeadConfig::default(),
        );
        assert!(result.converged);
        assert_relative_eq!(result.optimal_point[0], 0.3, epsilon = 1e-3);
    }

    #[test]
    fn flat_objective_converges_immediately() {
        let result = nelder_mead(|_| 0.0, &[0.2, 0.4], None, &NelderMeadConfig::default());
        assert!(result.converged);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2),
            &[10.0, 10.0],
            None,
            &NelderMeadConfig::default().with_max_iter(3),
        );
        assert!(!result.converged);
        let err = result.require_converged("test").unwrap_err();
        assert!(err.is_model_fit());
    }

    #[test]
    fn nan_objective_is_not_a_fit() {
        let result = nelder_mead(|_| f64::NAN, &[0.5], None, &NelderMeadConfig::default());
        assert!(result.require_converged("test").is_err());
    }

    #[test]
    fn empty_initial() {
        let result = nelder_mead(|_| 0.0, &[], None, &NelderMeadConfig::default());
        assert!(!result.converged);
        assert!(result.optimal_point.is_empty());
    }
}
