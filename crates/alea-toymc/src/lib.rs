//! # alea-toymc
//!
//! Toy Monte Carlo orchestration for alea.
//!
//! A [`Runner`] takes one [`RunnerConfig`] (model kind, parameter of interest, hypotheses,
//! toy-data policy, confidence-interval policy), validates it up front, and then repeats
//! "get toy data -> fit every hypothesis -> record" `n_mc` times:
//!
//! ```text
//! ToydataGenerator ──> model.load_dataset ──> fit(h) for h in hypotheses ──> ResultTable rows
//!        │                                                                        │
//!        └── toy-data file (generate_and_write)              result file <────────┘
//! ```
//!
//! The argument schema in [`args`] is shared with the CLI and the submitter.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Runner argument schema and typed configuration.
pub mod args;
/// `poi_expectation` resolution.
pub mod generate_values;
/// Hypotheses and their resolution.
pub mod hypothesis;
/// Result tables and files.
pub mod output;
/// The runner.
pub mod runner;
/// Toy-data modes and generator.
pub mod toydata;

pub use args::{
    arg_to_str, default_arguments, runner_argument, runner_arguments, str_to_arg, ArgKind, ArgSpec,
    RunnerConfig,
};
pub use hypothesis::Hypothesis;
pub use output::{ResultFile, ResultRecord, ResultTable};
pub use runner::{ProgressCallback, Runner};
pub use toydata::{ToydataGenerator, ToydataMode};
