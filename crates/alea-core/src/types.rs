//! Common data types for alea

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter name -> value mapping (hypotheses, generate values, nominal values, fit results).
pub type ValueMap = BTreeMap<String, f64>;

/// One named record array: column name -> column values.
///
/// All columns of an array have the same length (one entry per record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArray {
    /// Array name (e.g. the likelihood term it feeds)
    pub name: String,
    /// Column-oriented records
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl DataArray {
    /// Create an empty array
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: BTreeMap::new() }
    }

    /// Builder-style column insertion
    pub fn with_column(mut self, column: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(column.into(), values);
        self
    }

    /// Number of records (length of the first column, 0 if there are none)
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    /// True if the array holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column values by name
    pub fn column(&self, column: &str) -> Option<&[f64]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// Single value lookup, failing with a descriptive error
    pub fn value(&self, column: &str, row: usize) -> Result<f64> {
        let values = self.column(column).ok_or_else(|| {
            Error::Validation(format!("array '{}' has no column '{}'", self.name, column))
        })?;
        values.get(row).copied().ok_or_else(|| {
            Error::Validation(format!(
                "array '{}' column '{}' has {} records, row {} requested",
                self.name,
                column,
                values.len(),
                row
            ))
        })
    }
}

/// One toy dataset: the ordered arrays a model consumes for one experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    /// Arrays in model order
    pub arrays: Vec<DataArray>,
}

impl Dataset {
    /// Create a dataset from arrays
    pub fn new(arrays: Vec<DataArray>) -> Self {
        Self { arrays }
    }

    /// Array names in order
    pub fn names(&self) -> Vec<String> {
        self.arrays.iter().map(|a| a.name.clone()).collect()
    }

    /// Array by name
    pub fn array(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    /// Array by name, failing if absent
    pub fn require_array(&self, name: &str) -> Result<&DataArray> {
        self.array(name).ok_or_else(|| {
            Error::Validation(format!("dataset has no array '{}', found {:?}", name, self.names()))
        })
    }
}

/// Fit result with named best-fit values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit value of every fittable parameter (fixed ones at their fixed value)
    pub values: ValueMap,

    /// Log-likelihood at the best fit
    pub max_ll: f64,

    /// Convergence status
    pub converged: bool,

    /// Number of optimizer iterations
    pub n_iter: u64,

    /// Number of likelihood evaluations
    pub n_fev: usize,
}

impl FitResult {
    /// Create a new fit result
    pub fn new(values: ValueMap, max_ll: f64, converged: bool, n_iter: u64, n_fev: usize) -> Self {
        Self { values, max_ll, converged, n_iter, n_fev }
    }

    /// Best-fit value of a parameter
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}
