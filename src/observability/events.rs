//! Observable events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events during planning and execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Planning
    /// Greedy optimizer produced a plan
    PlanBuilt,

    // External sort
    /// Run generation finished
    SortRunsGenerated,
    /// One merge round finished
    SortMergeRound,
    /// Sort reduced to a single run
    SortComplete,

    // Joins
    /// Right input materialized to a run
    JoinRightMaterialized,
    /// Join produced its last batch
    JoinComplete,

    // Query lifecycle
    /// Query pulled to exhaustion
    QueryComplete,
    /// Query aborted by an error; logged at the error's own severity
    QueryAborted,

    // Cleanup
    /// A run file could not be deleted
    RunCleanupFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PlanBuilt => "PLAN_BUILT",
            Event::SortRunsGenerated => "SORT_RUNS_GENERATED",
            Event::SortMergeRound => "SORT_MERGE_ROUND",
            Event::SortComplete => "SORT_COMPLETE",
            Event::JoinRightMaterialized => "JOIN_RIGHT_MATERIALIZED",
            Event::JoinComplete => "JOIN_COMPLETE",
            Event::QueryComplete => "QUERY_COMPLETE",
            Event::QueryAborted => "QUERY_ABORTED",
            Event::RunCleanupFailed => "RUN_CLEANUP_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryAborted => Severity::Error,
            Event::RunCleanupFailed => Severity::Warn,
            Event::SortMergeRound => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
