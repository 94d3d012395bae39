//! Parameter definitions and the per-model Parameter Set.

use crate::{Error, Result, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional (lower, upper) pair; `None` on a side means unbounded.
pub type Limits = (Option<f64>, Option<f64>);

fn default_true() -> bool {
    true
}

/// A single model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name (unique within a model)
    #[serde(default)]
    pub name: String,
    /// Nominal value, used whenever no explicit value is supplied
    #[serde(default)]
    pub nominal_value: Option<f64>,
    /// Whether the value is determined by the fit
    #[serde(default = "default_true")]
    pub fittable: bool,
    /// Informational type tag (`rate`, `shape`, `efficiency`, ...)
    #[serde(default)]
    pub ptype: Option<String>,
    /// Ancillary-measurement uncertainty
    #[serde(default)]
    pub uncertainty: Option<f64>,
    /// Interpret `uncertainty` relative to the nominal value
    #[serde(default)]
    pub relative_uncertainty: bool,
    /// Fit limits
    #[serde(default)]
    pub fit_limits: Option<Limits>,
    /// Search range for confidence intervals (falls back to `fit_limits`)
    #[serde(default)]
    pub parameter_interval_bounds: Option<Limits>,
    /// Starting point of fits (falls back to `nominal_value`)
    #[serde(default)]
    pub fit_guess: Option<f64>,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
}

impl Parameter {
    /// Fittable parameter with no nominal value and no limits
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nominal_value: None,
            fittable: true,
            ptype: None,
            uncertainty: None,
            relative_uncertainty: false,
            fit_limits: None,
            parameter_interval_bounds: None,
            fit_guess: None,
            description: None,
        }
    }

    /// Builder: nominal value
    pub fn with_nominal(mut self, value: f64) -> Self {
        self.nominal_value = Some(value);
        self
    }

    /// Builder: fit limits
    pub fn with_fit_limits(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.fit_limits = Some((lower, upper));
        self
    }

    /// Builder: fittable flag
    pub fn with_fittable(mut self, fittable: bool) -> Self {
        self.fittable = fittable;
        self
    }

    /// Builder: ancillary uncertainty
    pub fn with_uncertainty(mut self, uncertainty: f64, relative: bool) -> Self {
        self.uncertainty = Some(uncertainty);
        self.relative_uncertainty = relative;
        self
    }

    /// Fit bounds with unbounded sides mapped to infinities.
    pub fn bounds(&self) -> (f64, f64) {
        let (lo, hi) = self.fit_limits.unwrap_or((None, None));
        (lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY))
    }

    /// Confidence-interval search range (falls back to fit bounds).
    pub fn interval_bounds(&self) -> (f64, f64) {
        match self.parameter_interval_bounds {
            Some((lo, hi)) => {
                let (flo, fhi) = self.bounds();
                (lo.unwrap_or(flo), hi.unwrap_or(fhi))
            }
            None => self.bounds(),
        }
    }

    /// Initial value for fits
    pub fn effective_fit_guess(&self) -> Option<f64> {
        self.fit_guess.or(self.nominal_value)
    }

    /// Whether `value` lies inside the fit limits (inclusive)
    pub fn value_in_fit_limits(&self, value: f64) -> bool {
        let (lo, hi) = self.bounds();
        lo <= value && value <= hi
    }

    /// Clip `value` into the fit limits
    pub fn clip_to_fit_limits(&self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        value.max(lo).min(hi)
    }

    /// Absolute ancillary uncertainty (relative ones are scaled by the nominal value)
    pub fn absolute_uncertainty(&self) -> Option<f64> {
        let unc = self.uncertainty?;
        if self.relative_uncertainty {
            Some(unc * self.nominal_value?)
        } else {
            Some(unc)
        }
    }

    /// Check the parameter's invariants.
    pub fn validate(&self) -> Result<()> {
        if let Some((Some(lo), Some(hi))) = self.fit_limits {
            if lo > hi {
                return Err(Error::Validation(format!(
                    "parameter '{}': fit limits lower {} > upper {}",
                    self.name, lo, hi
                )));
            }
        }
        if let Some((Some(lo), Some(hi))) = self.parameter_interval_bounds {
            if lo > hi {
                return Err(Error::Validation(format!(
                    "parameter '{}': parameter_interval_bounds lower {} > upper {}",
                    self.name, lo, hi
                )));
            }
        }
        if self.fittable {
            let guess = self.effective_fit_guess().ok_or_else(|| {
                Error::Validation(format!(
                    "parameter '{}' is fittable but has neither fit_guess nor nominal_value",
                    self.name
                ))
            })?;
            if !guess.is_finite() || !self.value_in_fit_limits(guess) {
                return Err(Error::Validation(format!(
                    "parameter '{}': fit guess {} outside fit limits {:?}",
                    self.name,
                    guess,
                    self.bounds()
                )));
            }
        }
        if self.relative_uncertainty && self.uncertainty.is_some() && self.nominal_value.is_none()
        {
            return Err(Error::Validation(format!(
                "parameter '{}' has a relative uncertainty but no nominal_value",
                self.name
            )));
        }
        Ok(())
    }
}

/// Parameter definition as found in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterDefinition {
    /// Bare names: fittable parameters without nominal values
    Names(Vec<String>),
    /// Name -> full parameter description
    Detailed(BTreeMap<String, Parameter>),
}

/// Ordered set of parameters owned by one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    parameters: Vec<Parameter>,
}

impl Parameters {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a configuration definition.
    pub fn from_definition(definition: &ParameterDefinition) -> Result<Self> {
        let mut out = Self::new();
        match definition {
            ParameterDefinition::Names(names) => {
                for name in names {
                    out.add_parameter(Parameter::new(name.clone()))?;
                }
            }
            ParameterDefinition::Detailed(map) => {
                for (key, param) in map {
                    let mut param = param.clone();
                    if param.name.is_empty() {
                        param.name = key.clone();
                    } else if &param.name != key {
                        return Err(Error::Validation(format!(
                            "parameter key '{}' does not match its name '{}'",
                            key, param.name
                        )));
                    }
                    out.add_parameter(param)?;
                }
            }
        }
        Ok(out)
    }

    /// Append a parameter; names must be unique.
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<()> {
        if self.get(&parameter.name).is_some() {
            return Err(Error::Validation(format!(
                "parameter '{}' is already defined",
                parameter.name
            )));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Check every parameter's invariants.
    pub fn validate(&self) -> Result<()> {
        self.parameters.iter().try_for_each(Parameter::validate)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True if there are no parameters
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterate in definition order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Parameter by name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameter by name, failing if absent
    pub fn require(&self, name: &str) -> Result<&Parameter> {
        self.get(name).ok_or_else(|| {
            Error::Validation(format!("unknown parameter '{}', known: {:?}", name, self.names()))
        })
    }

    /// All names in definition order
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Fittable names in definition order
    pub fn fittable(&self) -> Vec<String> {
        self.parameters.iter().filter(|p| p.fittable).map(|p| p.name.clone()).collect()
    }

    /// Non-fittable names in definition order
    pub fn not_fittable(&self) -> Vec<String> {
        self.parameters.iter().filter(|p| !p.fittable).map(|p| p.name.clone()).collect()
    }

    /// Names of parameters carrying an ancillary uncertainty
    pub fn with_uncertainty(&self) -> Vec<String> {
        self.parameters.iter().filter(|p| p.uncertainty.is_some()).map(|p| p.name.clone()).collect()
    }

    /// Name -> absolute uncertainty, for parameters that have one
    pub fn uncertainties(&self) -> ValueMap {
        self.parameters
            .iter()
            .filter_map(|p| p.absolute_uncertainty().map(|u| (p.name.clone(), u)))
            .collect()
    }

    /// Name -> nominal value, for parameters that have one
    pub fn nominal_values(&self) -> ValueMap {
        self.parameters
            .iter()
            .filter_map(|p| p.nominal_value.map(|v| (p.name.clone(), v)))
            .collect()
    }

    /// Overwrite nominal values; every key must be a known parameter.
    pub fn set_nominal_values(&mut self, values: &ValueMap) -> Result<()> {
        for (name, &value) in values {
            let names = self.names();
            let param = self.parameters.iter_mut().find(|p| &p.name == name).ok_or_else(|| {
                Error::Validation(format!(
                    "nominal value given for unknown parameter '{}', known: {:?}",
                    name, names
                ))
            })?;
            param.nominal_value = Some(value);
        }
        Ok(())
    }

    /// Full value set for a likelihood call: nominal values overlaid by `overrides`.
    ///
    /// Fails on unknown override names and on parameters left without any value.
    pub fn call_values(&self, overrides: &ValueMap) -> Result<ValueMap> {
        for name in overrides.keys() {
            self.require(name)?;
        }
        let mut out = ValueMap::new();
        for p in &self.parameters {
            let value = overrides.get(&p.name).copied().or(p.nominal_value).ok_or_else(|| {
                Error::Validation(format!(
                    "parameter '{}' has no nominal value and none was provided",
                    p.name
                ))
            })?;
            out.insert(p.name.clone(), value);
        }
        Ok(out)
    }

}
