//! Error types for alea

use thiserror::Error;

/// alea error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error (fit failures, non-finite likelihoods)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Model kind missing from the registry
    #[error("Unknown model kind '{kind}', registered kinds: {known:?}")]
    UnknownModel {
        /// Requested kind
        kind: String,
        /// Kinds known to the registry
        known: Vec<String>,
    },

    /// Stored toy data cannot cover the requested number of Monte Carlo repetitions
    #[error("Number of stored toydata {stored} is less than number of Monte Carlo {n_mc}")]
    InsufficientToydata {
        /// Number of stored datasets
        stored: usize,
        /// Requested repetitions
        n_mc: usize,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
