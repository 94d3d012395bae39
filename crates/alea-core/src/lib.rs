//! # alea-core
//!
//! Core types and traits for alea.
//!
//! This crate provides:
//! - the shared [`Error`] type
//! - value maps, datasets and fit results
//! - the Parameter Set ([`Parameters`]) and its configuration form
//! - the [`StatisticalModel`] trait every model implements
//! - the JSON toy-data store ([`ToydataFile`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parameters;
pub mod toydata;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use parameters::{Limits, Parameter, ParameterDefinition, Parameters};
pub use toydata::{write_atomic, ToydataFile};
pub use traits::StatisticalModel;
pub use types::{DataArray, Dataset, FitResult, ValueMap};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
