//! Single-bin Poisson counting experiment with ancillary constraints.
//!
//! The expected count is `sum_c E_c * <c>_rate_multiplier`, where `E_c` is the nominal
//! expectation of component `c` from the likelihood configuration. Every parameter with an
//! uncertainty gets a Gaussian constraint centred on an ancillary measurement that is
//! generated together with the count.

use crate::registry::ModelArgs;
use alea_core::{
    DataArray, Dataset, Error, Parameter, ParameterDefinition, Parameters, Result,
    StatisticalModel, ValueMap,
};
use rand::RngCore;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use std::collections::BTreeMap;

/// Suffix of per-component rate parameters
pub const RATE_MULTIPLIER_SUFFIX: &str = "_rate_multiplier";
/// Array holding the observed count
pub const SCIENCE_ARRAY: &str = "science";
/// Array holding the ancillary measurements
pub const ANCILLARY_ARRAY: &str = "ancillary";

/// Likelihood configuration of the counting model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountingConfig {
    /// Component name -> nominal expected count
    pub components: BTreeMap<String, f64>,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            components: [("background".to_string(), 50.0), ("signal".to_string(), 10.0)]
                .into_iter()
                .collect(),
        }
    }
}

/// Poisson counting model
#[derive(Debug, Clone)]
pub struct CountingModel {
    parameters: Parameters,
    config: CountingConfig,
    data: Option<Dataset>,
    observed: Option<f64>,
    ancillary: ValueMap,
}

fn rate_parameter(component: &str) -> String {
    format!("{component}{RATE_MULTIPLIER_SUFFIX}")
}

fn ln_poisson(n: f64, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if n == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    n * lambda.ln() - lambda - ln_gamma(n + 1.0)
}

fn ln_normal(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}

impl CountingModel {
    /// Registry tag
    pub const KIND: &'static str = "counting";

    /// One fittable, non-negative rate multiplier per component (nominal 1).
    ///
    /// The `signal` multiplier gets interval bounds `[0, 50]`; the `background` multiplier a
    /// 10% relative ancillary constraint.
    pub fn default_definition(config: &CountingConfig) -> ParameterDefinition {
        let mut map = BTreeMap::new();
        for component in config.components.keys() {
            let name = rate_parameter(component);
            let mut p =
                Parameter::new(name.clone()).with_nominal(1.0).with_fit_limits(Some(0.0), None);
            p.ptype = Some("rate".to_string());
            match component.as_str() {
                "signal" => p.parameter_interval_bounds = Some((Some(0.0), Some(50.0))),
                "background" => p = p.with_uncertainty(0.1, true),
                _ => {}
            }
            map.insert(name, p);
        }
        ParameterDefinition::Detailed(map)
    }

    /// Build from a likelihood configuration and parameter definition.
    pub fn new(config: CountingConfig, definition: Option<&ParameterDefinition>) -> Result<Self> {
        if config.components.is_empty() {
            return Err(Error::Validation("counting model needs at least one component".into()));
        }
        let invalid = config.components.iter().find(|(_, e)| !(e.is_finite() && **e > 0.0));
        if let Some((c, e)) = invalid {
            return Err(Error::Validation(format!(
                "component '{}' needs a positive expectation, got {}",
                c, e
            )));
        }
        let parameters = match definition {
            Some(def) => Parameters::from_definition(def)?,
            None => Parameters::from_definition(&Self::default_definition(&config))?,
        };
        for component in config.components.keys() {
            parameters.require(&rate_parameter(component))?;
        }
        Ok(Self { parameters, config, data: None, observed: None, ancillary: ValueMap::new() })
    }

    /// Registry factory
    pub fn factory(args: &ModelArgs) -> Result<Box<dyn StatisticalModel>> {
        args.reject_unknown_model_args(Self::KIND, &[])?;
        let config = match &args.likelihood_config {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::Config(format!("invalid counting likelihood_config: {}", e))
            })?,
            None => CountingConfig::default(),
        };
        Ok(Box::new(Self::new(config, args.parameter_definition.as_ref())?))
    }

    fn expected_total(&self, values: &ValueMap) -> f64 {
        self.config.components.iter().map(|(c, e)| e * values[&rate_parameter(c)]).sum()
    }

    /// Constraint centre of `name`: the loaded ancillary measurement, else the nominal value.
    fn constraint_centre(&self, name: &str) -> Option<f64> {
        self.ancillary
            .get(name)
            .copied()
            .or_else(|| self.parameters.get(name).and_then(|p| p.nominal_value))
    }
}

impl StatisticalModel for CountingModel {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn ll(&self, values: &ValueMap) -> Result<f64> {
        let values = self.parameters.call_values(values)?;
        let n = self
            .observed
            .ok_or_else(|| Error::Validation("counting model has no data loaded".to_string()))?;
        let mut ll = ln_poisson(n, self.expected_total(&values));
        for (name, sigma) in self.parameters.uncertainties() {
            let Some(centre) = self.constraint_centre(&name) else {
                continue;
            };
            ll += ln_normal(centre, values[&name], sigma);
        }
        Ok(ll)
    }

    fn generate_data(&self, values: &ValueMap, rng: &mut dyn RngCore) -> Result<Dataset> {
        let values = self.parameters.call_values(values)?;
        let lambda = self.expected_total(&values);
        let n = if lambda > 0.0 && lambda.is_finite() {
            rand_distr::Poisson::new(lambda)
                .map_err(|e| Error::Computation(format!("Poisson({}): {}", lambda, e)))?
                .sample(rng)
        } else {
            0.0
        };

        let mut ancillary = DataArray::new(ANCILLARY_ARRAY);
        for (name, sigma) in self.parameters.uncertainties() {
            let param = self.parameters.require(&name)?;
            let measurement = rand_distr::Normal::new(values[&name], sigma)
                .map_err(|e| Error::Computation(format!("ancillary '{}': {}", name, e)))?
                .sample(rng);
            ancillary = ancillary.with_column(name, vec![param.clip_to_fit_limits(measurement)]);
        }

        Ok(Dataset::new(vec![DataArray::new(SCIENCE_ARRAY).with_column("n", vec![n]), ancillary]))
    }

    fn load_dataset(&mut self, data: Option<Dataset>) -> Result<()> {
        let Some(data) = data else {
            return Ok(());
        };
        let n = data.require_array(SCIENCE_ARRAY)?.value("n", 0)?;
        if !(n >= 0.0 && n.fract() == 0.0) {
            return Err(Error::Validation(format!(
                "observed count must be a natural number, got {}",
                n
            )));
        }
        let mut ancillary = ValueMap::new();
        if let Some(array) = data.array(ANCILLARY_ARRAY) {
            for name in array.columns.keys() {
                self.parameters.require(name)?;
                ancillary.insert(name.clone(), array.value(name, 0)?);
            }
        }
        self.observed = Some(n);
        self.ancillary = ancillary;
        self.data = Some(data);
        Ok(())
    }

    fn data(&self) -> Option<&Dataset> {
        self.data.as_ref()
    }

    fn get_expectation_values(&self, values: &ValueMap) -> Result<ValueMap> {
        let values = self.parameters.call_values(values)?;
        Ok(self
            .config
            .components
            .iter()
            .map(|(c, e)| (c.clone(), e * values[&rate_parameter(c)]))
            .collect())
    }

    fn data_names(&self) -> Option<Vec<String>> {
        Some(vec![SCIENCE_ARRAY.to_string(), ANCILLARY_ARRAY.to_string()])
    }
}
