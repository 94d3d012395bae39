//! # alea-models
//!
//! Concrete statistical models for alea and the registry that selects them by kind.
//!
//! - `gaussian`: one Gaussian measurement of `mu` with width `sigma`
//! - `counting`: single-bin Poisson count with rate multipliers and ancillary constraints

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Model configuration files.
pub mod config;
/// Poisson counting model.
pub mod counting;
/// Gaussian measurement model.
pub mod gaussian;
/// Model kind -> factory registry.
pub mod registry;

pub use config::{load_model_config, read_config, ModelConfig};
pub use counting::{CountingConfig, CountingModel};
pub use gaussian::GaussianModel;
pub use registry::{ModelArgs, ModelFactory, ModelRegistry};
