//! Core traits for alea
//!
//! This module defines the statistical model contract the runner drives:
//! inference (`alea-inference`) and orchestration (`alea-toymc`) only see
//! `dyn StatisticalModel`, never a concrete likelihood.

use crate::{Dataset, Parameters, Result, ToydataFile, ValueMap};
use rand::RngCore;
use std::path::Path;

/// Statistical model over one current dataset.
///
/// Value arguments are *overrides*: parameters missing from the map take their
/// nominal value (see [`Parameters::call_values`]).
pub trait StatisticalModel: Send {
    /// Model kind tag (as registered)
    fn name(&self) -> &str;

    /// The model's parameter set
    fn parameters(&self) -> &Parameters;

    /// Mutable access to the parameter set (nominal values, fit guesses)
    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Log-likelihood of the current dataset.
    fn ll(&self, values: &ValueMap) -> Result<f64>;

    /// Draw one dataset at the given parameter point.
    fn generate_data(&self, values: &ValueMap, rng: &mut dyn RngCore) -> Result<Dataset>;

    /// Replace the current dataset.
    ///
    /// Implementations validate the arrays they need and refresh any state derived
    /// from the data (e.g. ancillary-measurement centres) before returning. `None`
    /// keeps whatever data the model already holds.
    fn load_dataset(&mut self, data: Option<Dataset>) -> Result<()>;

    /// Current dataset, if any
    fn data(&self) -> Option<&Dataset>;

    /// Expected yield per component at the given parameter point.
    fn get_expectation_values(&self, _values: &ValueMap) -> Result<ValueMap> {
        Err(crate::Error::NotImplemented(format!(
            "model '{}' does not provide expectation values",
            self.name()
        )))
    }

    /// Names of the arrays of a dataset, if the model has fixed ones
    fn data_names(&self) -> Option<Vec<String>> {
        None
    }

    /// All parameter names
    fn get_parameter_list(&self) -> Vec<String> {
        self.parameters().names()
    }

    /// Fittable parameter names
    fn fittable(&self) -> Vec<String> {
        self.parameters().fittable()
    }

    /// Non-fittable parameter names
    fn not_fittable(&self) -> Vec<String> {
        self.parameters().not_fittable()
    }

    /// Persist datasets as one toy-data file.
    fn store_data(
        &self,
        path: &Path,
        datasets: Vec<Dataset>,
        names: Option<Vec<String>>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        ToydataFile::new(datasets, names.or_else(|| self.data_names()), metadata).write(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataArray, Parameter};

    struct DummyModel {
        parameters: Parameters,
        data: Option<Dataset>,
    }

    impl StatisticalModel for DummyModel {
        fn name(&self) -> &str {
            "dummy"
        }

        fn parameters(&self) -> &Parameters {
            &self.parameters
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.parameters
        }

        fn ll(&self, values: &ValueMap) -> Result<f64> {
            let values = self.parameters.call_values(values)?;
            Ok(-values["x"].powi(2))
        }

        fn generate_data(&self, _values: &ValueMap, rng: &mut dyn RngCore) -> Result<Dataset> {
            let x = (rng.next_u32() % 10) as f64;
            Ok(Dataset::new(vec![DataArray::new("d").with_column("x", vec![x])]))
        }

        fn load_dataset(&mut self, data: Option<Dataset>) -> Result<()> {
            if data.is_some() {
                self.data = data;
            }
            Ok(())
        }

        fn data(&self) -> Option<&Dataset> {
            self.data.as_ref()
        }
    }

    #[test]
    fn test_dummy_model_defaults() {
        let mut parameters = Parameters::new();
        parameters.add_parameter(Parameter::new("x").with_nominal(1.0)).unwrap();
        let y = Parameter::new("y").with_nominal(0.0).with_fittable(false);
        parameters.add_parameter(y).unwrap();
        let mut model = DummyModel { parameters, data: None };

        assert_eq!(model.get_parameter_list(), vec!["x", "y"]);
        assert_eq!(model.fittable(), vec!["x"]);
        assert_eq!(model.not_fittable(), vec!["y"]);
        assert_eq!(model.ll(&ValueMap::new()).unwrap(), -1.0);
        assert!(matches!(
            model.get_expectation_values(&ValueMap::new()),
            Err(crate::Error::NotImplemented(_))
        ));

        let mut rng = rand::rngs::mock::StepRng::new(3, 1);
        let ds = model.generate_data(&ValueMap::new(), &mut rng).unwrap();
        model.load_dataset(Some(ds.clone())).unwrap();
        model.load_dataset(None).unwrap();
        assert_eq!(model.data(), Some(&ds));
    }
}
