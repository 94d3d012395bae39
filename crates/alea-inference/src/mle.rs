//! Maximum Likelihood Estimation under fixed-parameter hypotheses

use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};
use alea_core::{Error, FitResult, Result, StatisticalModel, ValueMap};

/// `-ll` as a function of the free parameters only.
struct NegLogLikelihood<'a> {
    model: &'a dyn StatisticalModel,
    free: &'a [String],
    base: &'a ValueMap,
}

impl NegLogLikelihood<'_> {
    fn values_at(&self, params: &[f64]) -> ValueMap {
        let mut values = self.base.clone();
        for (name, &v) in self.free.iter().zip(params) {
            values.insert(name.clone(), v);
        }
        values
    }
}

impl ObjectiveFunction for NegLogLikelihood<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        let ll = self.model.ll(&self.values_at(params))?;
        if ll.is_nan() {
            return Err(Error::Computation(format!(
                "log-likelihood is NaN at {:?}",
                self.values_at(params)
            )));
        }
        Ok(-ll)
    }
}

/// Maximum Likelihood Estimator
///
/// Maximizes a model's log-likelihood over its fittable parameters, holding the
/// parameters of a hypothesis fixed.
#[derive(Debug, Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    optimizer: LbfgsbOptimizer,
    config: OptimizerConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create a new MLE with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create MLE with custom optimizer configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { optimizer: LbfgsbOptimizer::new(config.clone()), config }
    }

    /// Access the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit `model` with the parameters in `fixed` held at their values.
    ///
    /// Every other fittable parameter is free, starting from its fit guess and bounded by
    /// its fit limits; non-fittable parameters stay at their nominal values. The returned
    /// values cover every fittable parameter. A fit that does not converge is an error.
    pub fn fit(&self, model: &dyn StatisticalModel, fixed: &ValueMap) -> Result<FitResult> {
        let parameters = model.parameters();
        for name in fixed.keys() {
            parameters.require(name)?;
        }

        let fittable = parameters.fittable();
        let free: Vec<String> =
            fittable.iter().filter(|name| !fixed.contains_key(*name)).cloned().collect();

        let mut init = Vec::with_capacity(free.len());
        let mut bounds = Vec::with_capacity(free.len());
        let mut start = fixed.clone();
        for name in &free {
            let p = parameters.require(name)?;
            let guess = p.effective_fit_guess().ok_or_else(|| {
                Error::Validation(format!("parameter '{}' has no fit guess", name))
            })?;
            init.push(guess);
            bounds.push(p.bounds());
            start.insert(name.clone(), guess);
        }
        let base = parameters.call_values(&start)?;

        let objective = NegLogLikelihood { model, free: &free, base: &base };
        let result = self.optimizer.minimize(&objective, &init, &bounds)?;
        log::debug!("fit fixed={:?}: {}", fixed, result);

        if !result.converged || !result.fval.is_finite() {
            return Err(Error::Computation(format!(
                "fit of model '{}' with fixed {:?} did not converge: {} ({})",
                model.name(),
                fixed,
                result.message,
                result
            )));
        }

        let best = objective.values_at(&result.parameters);
        let values: ValueMap = fittable
            .iter()
            .filter_map(|name| best.get(name).map(|&v| (name.clone(), v)))
            .collect();

        Ok(FitResult::new(values, -result.fval, result.converged, result.n_iter, result.n_fev))
    }
}
