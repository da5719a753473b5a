//! Record model errors

use thiserror::Error;

/// Result type for record model operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised while building or manipulating records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Page of {page_size} bytes cannot hold a {tuple_size}-byte tuple")]
    PageTooSmall { page_size: usize, tuple_size: usize },

    #[error("Batch is full (capacity {0})")]
    BatchFull(usize),

    #[error("Attribute not found in schema: {0}")]
    AttributeNotFound(String),

    #[error("Tuple arity {actual} does not match schema arity {expected}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Value {value} does not conform to type {expected}")]
    TypeMismatch { expected: String, value: String },

    #[error("Unknown data type: {0}")]
    UnknownType(String),
}
