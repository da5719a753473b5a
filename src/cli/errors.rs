//! Errors surfaced by the `qproc` binary
//!
//! All CLI errors end the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::operator::ExecutorError;
use crate::optimizer::PlannerError;
use crate::record::RecordError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (files, stdout)
    IoError,
    /// Malformed catalog or query file
    InvalidInput,
    /// Optimizer rejected the query
    PlanRejected,
    /// Query failed while running
    ExecutionFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "QP_CLI_CONFIG_ERROR",
            Self::IoError => "QP_CLI_IO_ERROR",
            Self::InvalidInput => "QP_CLI_INVALID_INPUT",
            Self::PlanRejected => "QP_CLI_PLAN_REJECTED",
            Self::ExecutionFailed => "QP_CLI_EXECUTION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        Self::io_error(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", err))
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config_error(err.to_string())
    }
}

impl From<RecordError> for CliError {
    fn from(err: RecordError) -> Self {
        Self::invalid_input(err.to_string())
    }
}

impl From<PlannerError> for CliError {
    fn from(err: PlannerError) -> Self {
        Self::new(CliErrorCode::PlanRejected, err.to_string())
    }
}

impl From<ExecutorError> for CliError {
    fn from(err: ExecutorError) -> Self {
        Self::new(CliErrorCode::ExecutionFailed, err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
