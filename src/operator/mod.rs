//! Execution operators for qproc
//!
//! Every node implements the pull-based [`Operator`] protocol. Parents open
//! their children, pull batches with `next()` and close them; pages flow up
//! the tree and ownership of each batch moves with it.
//!
//! # Operators
//!
//! - [`TableScan`], [`Select`], [`Project`]: single-pass streaming operators
//! - [`ExternalSort`]: run generation plus multi-way merge in `B` frames
//! - [`BlockNestedJoin`]: `B - 2` frame left blocks against a spilled right input
//! - [`SortMergeJoin`]: merge of two externally sorted inputs with a bounded
//!   right-side window
//!
//! # Protocol
//!
//! - `next()` returns a non-empty batch, or `Ok(None)` once exhausted
//! - After exhaustion `next()` keeps returning `Ok(None)`
//! - `close()` releases run files and is safe to call more than once

mod block_nested;
mod errors;
mod project;
mod scan;
mod select;
mod sort;
mod sort_merge;

pub use block_nested::BlockNestedJoin;
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult, Severity};
pub use project::Project;
pub use scan::TableScan;
pub use select::Select;
pub use sort::ExternalSort;
pub use sort_merge::SortMergeJoin;

use crate::record::{Batch, Schema};

/// The pull-based iterator contract every execution node implements
pub trait Operator {
    /// Acquires resources and opens children
    fn open(&mut self) -> ExecutorResult<()>;

    /// Next non-empty batch, or `None` when exhausted
    fn next(&mut self) -> ExecutorResult<Option<Batch>>;

    /// Releases resources (run files, open readers)
    fn close(&mut self) -> ExecutorResult<()>;

    /// Output schema
    fn schema(&self) -> &Schema;

    /// Operator name for diagnostics
    fn name(&self) -> &'static str;
}

/// Owned, dynamically dispatched operator
pub type BoxedOperator = Box<dyn Operator>;

/// Lifecycle shared by all operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpState {
    Created,
    Open,
    Exhausted,
    Closed,
}

impl OpState {
    /// Returns `Ok(true)` when `next()` should produce output,
    /// `Ok(false)` once exhausted
    pub(crate) fn check_next(self, operator: &'static str) -> ExecutorResult<bool> {
        match self {
            OpState::Created => Err(ExecutorError::not_open(operator)),
            OpState::Closed => Err(ExecutorError::closed(operator)),
            OpState::Exhausted => Ok(false),
            OpState::Open => Ok(true),
        }
    }
}
