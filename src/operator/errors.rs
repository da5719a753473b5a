//! Executor error types
//!
//! Error codes:
//! - QP_SETUP_FAILED (ERROR) - an operator could not be built or opened
//! - QP_EXECUTION_FAILED (ERROR) - protocol misuse or a bad record
//! - QP_SPILL_FAILED (FATAL) - auxiliary storage I/O failed
//! - QP_RUN_CORRUPTION (FATAL) - a run could not be decoded
//! - QP_INVARIANT_VIOLATED (FATAL) - e.g. tuples lost during a merge
//!
//! End of input is never an error: `next()` returns `Ok(None)`.

use std::fmt;

use crate::record::RecordError;
use crate::spill::{SpillError, SpillErrorCode};

/// How bad an operator failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The query fails, nothing was corrupted
    Error,
    /// The query must abort; no partial result is usable
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Executor-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    QpSetupFailed,
    QpExecutionFailed,
    QpSpillFailed,
    QpRunCorruption,
    QpInvariantViolated,
}

impl ExecutorErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::QpSetupFailed => "QP_SETUP_FAILED",
            ExecutorErrorCode::QpExecutionFailed => "QP_EXECUTION_FAILED",
            ExecutorErrorCode::QpSpillFailed => "QP_SPILL_FAILED",
            ExecutorErrorCode::QpRunCorruption => "QP_RUN_CORRUPTION",
            ExecutorErrorCode::QpInvariantViolated => "QP_INVARIANT_VIOLATED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ExecutorErrorCode::QpSetupFailed | ExecutorErrorCode::QpExecutionFailed => {
                Severity::Error
            }
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Operator failure: code, message and the operator it came from
#[derive(Debug)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    message: String,
    /// Operator that raised the error, if known
    operator: Option<&'static str>,
    source: Option<SpillError>,
}

impl ExecutorError {
    fn new(code: ExecutorErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            operator: None,
            source: None,
        }
    }

    /// An operator could not be constructed or opened
    pub fn setup_failed(reason: impl Into<String>) -> Self {
        Self::new(ExecutorErrorCode::QpSetupFailed, reason)
    }

    /// General execution failure
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::new(ExecutorErrorCode::QpExecutionFailed, reason)
    }

    /// `next()` was called on an operator that is not open
    pub fn not_open(operator: &'static str) -> Self {
        Self::new(
            ExecutorErrorCode::QpExecutionFailed,
            format!("{} pulled before open()", operator),
        )
        .in_operator(operator)
    }

    /// `next()` was called on a closed operator
    pub fn closed(operator: &'static str) -> Self {
        Self::new(
            ExecutorErrorCode::QpExecutionFailed,
            format!("{} pulled after close()", operator),
        )
        .in_operator(operator)
    }

    /// A correctness invariant failed (FATAL)
    pub fn invariant_violated(reason: impl Into<String>) -> Self {
        Self::new(ExecutorErrorCode::QpInvariantViolated, reason)
    }

    /// Tags the error with the operator that raised it
    pub fn in_operator(mut self, operator: &'static str) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn code(&self) -> ExecutorErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn operator(&self) -> Option<&'static str> {
        self.operator
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.code.severity(), self.code.code())?;
        if let Some(operator) = self.operator {
            write!(f, "{}: ", operator)?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<SpillError> for ExecutorError {
    fn from(err: SpillError) -> Self {
        let code = match err.code() {
            SpillErrorCode::SpillCorruption => ExecutorErrorCode::QpRunCorruption,
            SpillErrorCode::SpillWriteFailed | SpillErrorCode::SpillReadFailed => {
                ExecutorErrorCode::QpSpillFailed
            }
        };
        Self {
            code,
            message: err.to_string(),
            operator: None,
            source: Some(err),
        }
    }
}

impl From<RecordError> for ExecutorError {
    fn from(err: RecordError) -> Self {
        Self::execution_failed(err.to_string())
    }
}

/// Result of an operator call
pub type ExecutorResult<T> = Result<T, ExecutorError>;
