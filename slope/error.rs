//! Error types shared by every fitting entry point.

use thiserror::Error;

/// A comprehensive error type for model configuration and fitting.
///
/// Everything here is raised eagerly at the boundary, before any solver
/// state is allocated. Convergence trouble is never an error; it is recorded
/// in the warning log and on the returned fit instead.
#[derive(Error, Debug)]
pub enum SlopeError {
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}.")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Non-finite values (NaN or Infinity) were found in {0}.")]
    NonFinite(&'static str),

    #[error("The response does not fit the {loss} loss: {reason}")]
    UnsupportedResponse { loss: &'static str, reason: String },

    #[error(
        "Alpha estimation selected {selected} predictors, which leaves no degrees of freedom for {n} observations."
    )]
    TooManySelected { selected: usize, n: usize },

    #[error("A linear system solve failed: {0}")]
    Linalg(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while reading or writing a parameter file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for configuration option '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl SlopeError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SlopeError::Invalid(msg.into())
    }
}
