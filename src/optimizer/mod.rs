//! Join-order optimizer for qproc
//!
//! Turns a [`LogicalQuery`] into a [`PlanNode`] tree: selections over their
//! scans, a left-deep join tree ordered greedily by cardinality, an optional
//! sort for ORDER BY, and an optional projection on top.
//!
//! # Invariants
//!
//! - Planning either succeeds completely or rejects the query; nothing runs
//! - Every from-list relation is scanned exactly once
//! - Each join is tagged with one strategy and one frame budget

mod catalog;
mod errors;
mod explain;
mod greedy;
mod plan;
mod query;

pub use catalog::{Catalog, MemoryCatalog, Relation};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::{ExplainNode, ExplainPlan};
pub use greedy::{buffers_per_join, GreedyOptimizer, MIN_BUFFERS_PER_JOIN};
pub use plan::{JoinNode, JoinStrategy, PlanNode};
pub use query::LogicalQuery;
