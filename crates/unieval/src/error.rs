//! Error types for the unieval CLI

use libunieval_core::EvalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CliError {
    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Eval(e) => e.error_code(),
            CliError::Io(_) => "io_error",
            CliError::Json(_) => "internal_error",
            CliError::TomlParse(_) | CliError::Config(_) => "configuration_error",
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Eval(e) => e.exit_code(),
            CliError::Io(_) | CliError::Json(_) => 1,
            CliError::TomlParse(_) | CliError::Config(_) => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
