//! Model registry: model kind tag -> factory.

use crate::counting::CountingModel;
use crate::gaussian::GaussianModel;
use alea_core::{Error, ParameterDefinition, Result, StatisticalModel, ValueMap};
use std::collections::BTreeMap;

/// Construction arguments handed to a model factory.
#[derive(Debug, Clone, Default)]
pub struct ModelArgs {
    /// Parameter definition (`None` -> the model's default)
    pub parameter_definition: Option<ParameterDefinition>,
    /// Likelihood configuration (model specific)
    pub likelihood_config: Option<serde_json::Value>,
    /// Nominal values applied after construction
    pub nominal_values: ValueMap,
    /// Extra model-specific arguments
    pub model_args: serde_json::Map<String, serde_json::Value>,
}

impl ModelArgs {
    /// Fail if `model_args` holds keys outside `allowed`.
    pub fn reject_unknown_model_args(&self, kind: &str, allowed: &[&str]) -> Result<()> {
        let unknown: Vec<&String> =
            self.model_args.keys().filter(|k| !allowed.contains(&k.as_str())).collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "model '{}' does not accept statistical_model_args {:?}",
                kind, unknown
            )))
        }
    }
}

/// Builds a model from its arguments.
pub type ModelFactory = fn(&ModelArgs) -> Result<Box<dyn StatisticalModel>>;

/// Explicit registry of model kinds, populated at process start.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<String, ModelFactory>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `gaussian` and `counting` models
    pub fn with_builtin_models() -> Self {
        let mut registry = Self::new();
        registry.register(GaussianModel::KIND, GaussianModel::factory);
        registry.register(CountingModel::KIND, CountingModel::factory);
        registry
    }

    /// Register (or replace) a factory
    pub fn register(&mut self, kind: impl Into<String>, factory: ModelFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Whether `kind` is registered
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Construct a model of `kind`, apply nominal values and validate its parameters.
    pub fn create(&self, kind: &str, args: &ModelArgs) -> Result<Box<dyn StatisticalModel>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::UnknownModel { kind: kind.to_string(), known: self.kinds() })?;
        let mut model = factory(args)?;
        model.parameters_mut().set_nominal_values(&args.nominal_values)?;
        model.parameters().validate()?;
        log::debug!("created model '{}' with parameters {:?}", kind, model.get_parameter_list());
        Ok(model)
    }
}
