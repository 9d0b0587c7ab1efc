//! Error types for the metabridge binary.

use metabridge_client::ClientError;
use thiserror::Error;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing or contradictory settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad command-line argument that clap could not catch.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Error from the Metabase client.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// I/O error (stdin, stdout, output files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `CliError`.
pub type Result<T> = std::result::Result<T, CliError>;
