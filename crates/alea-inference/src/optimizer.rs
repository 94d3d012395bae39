//! Bounded minimization
//!
//! Thin wrapper around argmin's L-BFGS with More-Thuente line search. Box constraints are
//! enforced by clamping every evaluation point and projecting the gradient at active bounds.

use alea_core::{Error, Result};
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// Restarts from the best point after a run that stops without converging
const MAX_RESTARTS: usize = 3;

/// Configuration for the L-BFGS optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the gradient norm
    pub tol: f64,
    /// Number of corrections kept for the inverse Hessian approximation
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Result of a minimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters (inside the bounds)
    pub parameters: Vec<f64>,
    /// Objective value at `parameters`
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations
    pub n_fev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.converged
        )
    }
}

/// Objective function to minimize
pub trait ObjectiveFunction {
    /// Evaluate at `params`
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params` (central differences unless overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = Vec::with_capacity(params.len());
        let mut shifted = params.to_vec();
        for i in 0..params.len() {
            let eps = 1e-8 * params[i].abs().max(1.0);

            shifted[i] = params[i] + eps;
            let f_plus = self.eval(&shifted)?;
            shifted[i] = params[i] - eps;
            let f_minus = self.eval(&shifted)?;
            shifted[i] = params[i];

            grad.push((f_plus - f_minus) / (2.0 * eps));
        }
        Ok(grad)
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

/// Zero the components pushing further out of an active bound.
fn project_gradient(grad: &mut [f64], params: &[f64], bounds: &[(f64, f64)]) {
    const EPS: f64 = 1e-12;
    for (gi, (&x, &(lo, hi))) in grad.iter_mut().zip(params.iter().zip(bounds)) {
        if (x <= lo + EPS && *gi > 0.0) || (x >= hi - EPS && *gi < 0.0) {
            *gi = 0.0;
        }
    }
}

/// Adapter between [`ObjectiveFunction`] and argmin
struct BoundedProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    n_fev: &'a Cell<usize>,
}

impl CostFunction for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.n_fev.set(self.n_fev.get() + 1);
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        project_gradient(&mut g, &clamped, self.bounds);
        Ok(g)
    }
}

/// L-BFGS optimizer with box constraints
#[derive(Debug, Clone, Default)]
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create an optimizer with the given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` from `init_params` inside `bounds`.
    ///
    /// An empty parameter vector is evaluated once and reported as converged. A run that
    /// stops early is restarted from its best point, up to `MAX_RESTARTS` times.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "Parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }
        if let Some((lo, hi)) = bounds.iter().find(|(lo, hi)| !(lo <= hi)) {
            return Err(Error::Validation(format!("Invalid bounds ({}, {})", lo, hi)));
        }

        if init_params.is_empty() {
            let fval = objective.eval(&[])?;
            return Ok(OptimizationResult {
                parameters: Vec::new(),
                fval,
                n_iter: 0,
                n_fev: 1,
                converged: fval.is_finite(),
                message: "no free parameters".to_string(),
            });
        }

        let mut start = clamp_params(init_params, bounds);
        let mut n_iter = 0;
        let mut n_fev = 0;
        let mut restarts = 0;
        loop {
            let run = self.run_lbfgs(objective, start, bounds)?;
            n_iter += run.n_iter;
            n_fev += run.n_fev;
            let converged = run.converged
                || (run.fval.is_finite()
                    && self.is_stationary(objective, &run.parameters, bounds, run.fval)?);
            if converged || restarts == MAX_RESTARTS || !run.fval.is_finite() {
                return Ok(OptimizationResult { n_iter, n_fev, converged, ..run });
            }
            restarts += 1;
            log::debug!("restarting L-BFGS from the best point ({}): {}", restarts, run.message);
            start = run.parameters;
        }
    }

    fn run_lbfgs(
        &self,
        objective: &dyn ObjectiveFunction,
        init: Vec<f64>,
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        let n_fev = Cell::new(0usize);
        let problem = BoundedProblem { objective, bounds, n_fev: &n_fev };

        // Cost tolerance scaled from the gradient tolerance; argmin's default (~EPS) makes
        // well-converged log-likelihood fits run into max_iter.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("No best parameters found".to_string()))?;
        let parameters = clamp_params(best, bounds);
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(OptimizationResult {
            parameters,
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_fev: n_fev.get(),
            converged,
            message: termination.to_string(),
        })
    }

    /// Projected gradient vanishes at `params`: a minimum in the interior or pinned at bounds.
    ///
    /// The line search can stop short of a minimum that sits on a bound; this accepts it.
    fn is_stationary(
        &self,
        objective: &dyn ObjectiveFunction,
        params: &[f64],
        bounds: &[(f64, f64)],
        fval: f64,
    ) -> Result<bool> {
        let mut grad = objective.gradient(params)?;
        project_gradient(&mut grad, params, bounds);
        let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
        Ok(norm.is_finite() && norm <= self.config.tol.sqrt() * (1.0 + fval.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // f(x, y) = (x - 2)^2 + (y - 3)^2
    struct Quadratic;

    impl ObjectiveFunction for Quadratic {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            Ok((params[0] - 2.0).powi(2) + (params[1] - 3.0).powi(2))
        }

        fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![2.0 * (params[0] - 2.0), 2.0 * (params[1] - 3.0)])
        }
    }

    #[test]
    fn test_quadratic_unbounded() {
        let optimizer = LbfgsbOptimizer::default();
        let inf = f64::INFINITY;
        let result =
            optimizer.minimize(&Quadratic, &[0.0, 0.0], &[(-inf, inf), (-inf, inf)]).unwrap();

        assert!(result.converged, "{}", result);
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_minimum_outside_bounds_pins_to_bound() {
        let optimizer =
            LbfgsbOptimizer::new(OptimizerConfig { max_iter: 200, ..Default::default() });
        let result =
            optimizer.minimize(&Quadratic, &[4.0, 1.5], &[(3.0, 5.0), (1.0, 2.0)]).unwrap();

        assert_relative_eq!(result.parameters[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(result.parameters[1], 2.0, epsilon = 1e-6);
        assert!(result.converged, "Status: {}", result.message);
    }

    // Gaussian -ll of one measurement at 0.8; unbounded below in the width
    struct SingleMeasurement;

    impl ObjectiveFunction for SingleMeasurement {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            let (mu, sigma) = (params[0], params[1]);
            Ok(sigma.ln() + (0.8 - mu).powi(2) / (2.0 * sigma * sigma))
        }
    }

    #[test]
    fn test_diverging_direction_pins_to_bound() {
        let inf = f64::INFINITY;
        let result = LbfgsbOptimizer::default()
            .minimize(&SingleMeasurement, &[0.0, 1.0], &[(-inf, inf), (0.01, inf)])
            .unwrap();

        assert!(result.converged, "Status: {}", result.message);
        assert_relative_eq!(result.parameters[0], 0.8, epsilon = 1e-3);
        assert_relative_eq!(result.parameters[1], 0.01, epsilon = 1e-5);
        assert!(result.fval.is_finite());
    }

    // Numerical gradient path: f(x) = (x + 1)^2 - 5
    struct ShiftedNoGradient;

    impl ObjectiveFunction for ShiftedNoGradient {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            Ok((params[0] + 1.0).powi(2) - 5.0)
        }
    }

    #[test]
    fn test_numerical_gradient() {
        let g = ShiftedNoGradient.gradient(&[1.0]).unwrap();
        assert_relative_eq!(g[0], 4.0, epsilon = 1e-5);

        let result = LbfgsbOptimizer::default()
            .minimize(&ShiftedNoGradient, &[3.0], &[(-10.0, 10.0)])
            .unwrap();
        assert_relative_eq!(result.parameters[0], -1.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_no_free_parameters() {
        struct Constant;
        impl ObjectiveFunction for Constant {
            fn eval(&self, _params: &[f64]) -> Result<f64> {
                Ok(1.25)
            }
        }
        let result = LbfgsbOptimizer::default().minimize(&Constant, &[], &[]).unwrap();
        assert!(result.converged);
        assert_eq!(result.fval, 1.25);
    }

    #[test]
    fn test_length_mismatch_and_bad_bounds() {
        let optimizer = LbfgsbOptimizer::default();
        assert!(optimizer.minimize(&Quadratic, &[0.0], &[(0.0, 1.0), (0.0, 1.0)]).is_err());
        assert!(optimizer.minimize(&Quadratic, &[0.0, 0.0], &[(1.0, 0.0), (0.0, 1.0)]).is_err());
    }
}
