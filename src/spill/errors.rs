//! Spill error types
//!
//! Error codes:
//! - SPILL_WRITE_FAILED (FATAL)
//! - SPILL_READ_FAILED (FATAL)
//! - SPILL_CORRUPTION (FATAL)
//!
//! Every later read of a run depends on every earlier write having succeeded
//! exactly once, so none of these are retried.

use std::fmt;
use std::io;
use std::path::Path;

/// Spill-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillErrorCode {
    /// Creating, writing or flushing a run failed
    SpillWriteFailed,
    /// Opening or reading a run failed
    SpillReadFailed,
    /// Run content could not be decoded
    SpillCorruption,
}

impl SpillErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            SpillErrorCode::SpillWriteFailed => "SPILL_WRITE_FAILED",
            SpillErrorCode::SpillReadFailed => "SPILL_READ_FAILED",
            SpillErrorCode::SpillCorruption => "SPILL_CORRUPTION",
        }
    }
}

impl fmt::Display for SpillErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Spill error with the run path and underlying cause
#[derive(Debug)]
pub struct SpillError {
    code: SpillErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl SpillError {
    /// Write failure with an I/O source
    pub fn write_failed(path: &Path, source: io::Error) -> Self {
        Self {
            code: SpillErrorCode::SpillWriteFailed,
            message: format!("Failed to write run {}", path.display()),
            source: Some(source),
        }
    }

    /// Write failure without an I/O source (e.g. encoding)
    pub fn write_failed_no_source(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            code: SpillErrorCode::SpillWriteFailed,
            message: format!("Failed to write run {}: {}", path.display(), reason.into()),
            source: None,
        }
    }

    /// Read failure with an I/O source
    pub fn read_failed(path: &Path, source: io::Error) -> Self {
        Self {
            code: SpillErrorCode::SpillReadFailed,
            message: format!("Failed to read run {}", path.display()),
            source: Some(source),
        }
    }

    /// Undecodable run content
    pub fn corruption(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            code: SpillErrorCode::SpillCorruption,
            message: format!("Corrupt run {}: {}", path.display(), reason.into()),
            source: None,
        }
    }

    pub fn code(&self) -> SpillErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Spill errors always abort the query
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for SpillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[FATAL] {}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for SpillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for spill operations
pub type SpillResult<T> = Result<T, SpillError>;
