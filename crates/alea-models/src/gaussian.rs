//! Gaussian measurement model.
//!
//! One measurement `hat_mu ~ N(mu, sigma)` per toy experiment.

use crate::registry::ModelArgs;
use alea_core::{
    DataArray, Dataset, Error, Parameter, ParameterDefinition, Parameters, Result,
    StatisticalModel, ValueMap,
};
use rand::RngCore;
use rand_distr::Distribution;
use statrs::distribution::{Continuous, Normal};
use std::collections::BTreeMap;

/// Name of the dataset array holding the measurement
pub const ARRAY_NAME: &str = "gaussian";
/// Column of the measurement
pub const COLUMN: &str = "hat_mu";
/// Lower fit limit of `sigma` in the default definition.
///
/// With one measurement the free fit drives `sigma` to this limit, with `mu` at `hat_mu`.
pub const SIGMA_FIT_LOWER: f64 = 0.01;

/// Gaussian measurement of `mu` with width `sigma`.
#[derive(Debug, Clone)]
pub struct GaussianModel {
    parameters: Parameters,
    data: Option<Dataset>,
    hat_mu: Option<f64>,
}

impl GaussianModel {
    /// Registry tag
    pub const KIND: &'static str = "gaussian";

    /// `mu` (nominal 0) and `sigma` (nominal 1, fit limits `[SIGMA_FIT_LOWER, inf)`), both
    /// fittable.
    pub fn default_definition() -> ParameterDefinition {
        let mut map = BTreeMap::new();
        map.insert("mu".to_string(), Parameter::new("mu").with_nominal(0.0));
        map.insert(
            "sigma".to_string(),
            Parameter::new("sigma").with_nominal(1.0).with_fit_limits(Some(SIGMA_FIT_LOWER), None),
        );
        ParameterDefinition::Detailed(map)
    }

    /// Build from a parameter definition (default when `None`).
    pub fn new(definition: Option<&ParameterDefinition>) -> Result<Self> {
        let parameters = match definition {
            Some(def) => Parameters::from_definition(def)?,
            None => Parameters::from_definition(&Self::default_definition())?,
        };
        for required in ["mu", "sigma"] {
            if parameters.get(required).is_none() {
                return Err(Error::Validation(format!(
                    "gaussian model needs a '{}' parameter, got {:?}",
                    required,
                    parameters.names()
                )));
            }
        }
        Ok(Self { parameters, data: None, hat_mu: None })
    }

    /// Registry factory
    pub fn factory(args: &ModelArgs) -> Result<Box<dyn StatisticalModel>> {
        args.reject_unknown_model_args(Self::KIND, &[])?;
        Ok(Box::new(Self::new(args.parameter_definition.as_ref())?))
    }

    /// Measurement of the loaded dataset
    pub fn hat_mu(&self) -> Option<f64> {
        self.hat_mu
    }
}

impl StatisticalModel for GaussianModel {
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
        let hat_mu = self
            .hat_mu
            .ok_or_else(|| Error::Validation("gaussian model has no data loaded".to_string()))?;
        match Normal::new(values["mu"], values["sigma"]) {
            Ok(dist) => Ok(dist.ln_pdf(hat_mu)),
            // sigma <= 0 has zero likelihood
            Err(_) => Ok(f64::NEG_INFINITY),
        }
    }

    fn generate_data(&self, values: &ValueMap, rng: &mut dyn RngCore) -> Result<Dataset> {
        let values = self.parameters.call_values(values)?;
        let (mu, sigma) = (values["mu"], values["sigma"]);
        let dist = rand_distr::Normal::new(mu, sigma).map_err(|e| {
            Error::Validation(format!("cannot generate with mu={}, sigma={}: {}", mu, sigma, e))
        })?;
        let hat_mu = dist.sample(rng);
        Ok(Dataset::new(vec![DataArray::new(ARRAY_NAME).with_column(COLUMN, vec![hat_mu])]))
    }

    fn load_dataset(&mut self, data: Option<Dataset>) -> Result<()> {
        let Some(data) = data else {
            return Ok(());
        };
        self.hat_mu = Some(data.require_array(ARRAY_NAME)?.value(COLUMN, 0)?);
        self.data = Some(data);
        Ok(())
    }

    fn data(&self) -> Option<&Dataset> {
        self.data.as_ref()
    }

    fn data_names(&self) -> Option<Vec<String>> {
        Some(vec![ARRAY_NAME.to_string()])
    }
}
