//! Error types for punch program generation.
//!
//! Every failure the core can report is a variant here, so callers can map
//! each one to a corrective action (fix a key, close a file, pick a policy).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while validating a job or generating its program.
#[derive(Error, Debug)]
pub enum GenError {
    /// A required key is absent from the job record or head catalog.
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// The row traversal policy name is not one we know how to walk.
    #[error("Unknown row order policy: {0}")]
    UnknownOrderPolicy(String),

    /// A value that must be numeric is something else.
    #[error("Parameter '{key}' is not a number: {value}")]
    NonNumericInput { key: String, value: String },

    /// The record has every key but could not be read into job parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(#[from] serde_json::Error),

    /// The output destination could not be opened or replaced.
    #[error("Output file {} is unavailable: {source}", path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the output sink failed part way.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generation was stopped between layers by the caller.
    #[error("Generation cancelled")]
    Cancelled,
}

/// Result type alias for generation operations.
pub type GenResult<T> = Result<T, GenError>;
