//! # alea-inference
//!
//! Statistical inference for alea models.
//!
//! This crate provides:
//! - Maximum Likelihood Estimation under fixed-parameter hypotheses
//! - Profile-likelihood confidence intervals (central / upper / lower)
//!
//! ## Architecture
//!
//! Everything here works on `&dyn StatisticalModel` from alea-core, never on a
//! concrete likelihood.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Profile-likelihood confidence intervals.
pub mod confidence;
/// Maximum-likelihood estimation via bounded L-BFGS.
pub mod mle;
/// Generic numerical optimizer (L-BFGS backend).
pub mod optimizer;

pub use confidence::{confidence_interval, ConfidenceIntervalConfig, IntervalKind};
pub use mle::MaximumLikelihoodEstimator;
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
