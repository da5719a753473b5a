//! Per-execution counters
//!
//! - Counters only, monotonic
//! - One registry per execution context
//! - Relaxed atomics; values are exact once the query has finished

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one query execution
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    runs_created: AtomicU64,
    runs_deleted: AtomicU64,
    batches_written: AtomicU64,
    batches_read: AtomicU64,
    merge_rounds: AtomicU64,
    tuples_sorted: AtomicU64,
    join_output_tuples: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Spill metrics

    pub fn increment_runs_created(&self) {
        self.runs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_runs_deleted(&self) {
        self.runs_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_written(&self) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_read(&self) {
        self.batches_read.fetch_add(1, Ordering::Relaxed);
    }

    // Operator metrics

    pub fn increment_merge_rounds(&self) {
        self.merge_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tuples_sorted(&self, n: u64) {
        self.tuples_sorted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_join_output(&self, n: u64) {
        self.join_output_tuples.fetch_add(n, Ordering::Relaxed);
    }

    pub fn runs_created(&self) -> u64 {
        self.runs_created.load(Ordering::Relaxed)
    }

    pub fn runs_deleted(&self) -> u64 {
        self.runs_deleted.load(Ordering::Relaxed)
    }

    pub fn merge_rounds(&self) -> u64 {
        self.merge_rounds.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_created: self.runs_created.load(Ordering::Relaxed),
            runs_deleted: self.runs_deleted.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batches_read: self.batches_read.load(Ordering::Relaxed),
            merge_rounds: self.merge_rounds.load(Ordering::Relaxed),
            tuples_sorted: self.tuples_sorted.load(Ordering::Relaxed),
            join_output_tuples: self.join_output_tuples.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`MetricsRegistry`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_created: u64,
    pub runs_deleted: u64,
    pub batches_written: u64,
    pub batches_read: u64,
    pub merge_rounds: u64,
    pub tuples_sorted: u64,
    pub join_output_tuples: u64,
}

impl MetricsSnapshot {
    /// Runs created but not yet deleted
    pub fn live_runs(&self) -> u64 {
        self.runs_created.saturating_sub(self.runs_deleted)
    }
}
