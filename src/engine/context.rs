//! Per-query execution context shared by every operator in a tree

use std::path::Path;
use std::sync::Arc;

use crate::observability::MetricsRegistry;
use crate::operator::{ExecutorError, ExecutorResult};
use crate::record::Schema;
use crate::spill::SpillArea;

/// Page size, spill area and metrics for one query execution
#[derive(Debug)]
pub struct ExecutionContext {
    page_size: usize,
    spill: SpillArea,
    metrics: Arc<MetricsRegistry>,
}

impl ExecutionContext {
    /// Creates a context spilling into `spill_dir`
    pub fn new(page_size: usize, spill_dir: &Path) -> ExecutorResult<Self> {
        if page_size == 0 {
            return Err(ExecutorError::setup_failed("page size must be positive"));
        }
        let metrics = Arc::new(MetricsRegistry::new());
        let spill = SpillArea::new(spill_dir, Arc::clone(&metrics))?;
        Ok(Self {
            page_size,
            spill,
            metrics,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn spill(&self) -> &SpillArea {
        &self.spill
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Tuples per batch for `schema` at this page size
    pub fn batch_capacity(&self, schema: &Schema) -> ExecutorResult<usize> {
        schema
            .batch_capacity(self.page_size)
            .map_err(|e| ExecutorError::setup_failed(e.to_string()))
    }
}
