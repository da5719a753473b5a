//! Query execution driver for qproc
//!
//! Binds a plan to operators, opens the root, pulls it to exhaustion and
//! closes it. The root is closed on every path, so run files from a failed
//! query are cleaned up before the error is returned.

mod builder;
mod context;

pub use builder::{build_operator, TableProvider};
pub use context::ExecutionContext;

use std::sync::Arc;

use crate::observability::{
    log_event_at, log_event_with_fields, Event, MetricsSnapshot, ObservationScope, Severity,
};
use crate::operator::{ExecutorError, ExecutorResult, Operator};
use crate::optimizer::PlanNode;
use crate::record::{Batch, Schema, Tuple};

/// Result of a completed query
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub schema: Schema,
    pub tuples: Vec<Tuple>,
    pub metrics: MetricsSnapshot,
}

/// Runs plans inside one execution context
pub struct QueryEngine {
    ctx: Arc<ExecutionContext>,
}

impl QueryEngine {
    pub fn new(ctx: Arc<ExecutionContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Runs `plan` and collects every result tuple
    pub fn execute(&self, plan: &PlanNode, provider: &dyn TableProvider) -> ExecutorResult<QueryOutput> {
        let mut tuples = Vec::new();
        let metrics = self.stream(plan, provider, |batch| tuples.extend(batch))?;
        Ok(QueryOutput {
            schema: plan.schema().clone(),
            tuples,
            metrics,
        })
    }

    /// Runs `plan`, handing each output batch to `sink` as it is produced
    pub fn stream<F>(
        &self,
        plan: &PlanNode,
        provider: &dyn TableProvider,
        mut sink: F,
    ) -> ExecutorResult<MetricsSnapshot>
    where
        F: FnMut(Batch),
    {
        let scope = ObservationScope::new("QUERY");
        let mut root = match build_operator(plan, provider, &self.ctx) {
            Ok(root) => root,
            Err(e) => {
                log_aborted(&e);
                return Err(e);
            }
        };

        let mut emitted = 0usize;
        let pulled = drain(root.as_mut(), |batch| {
            emitted += batch.len();
            sink(batch);
        });
        let closed = root.close();

        if let Err(e) = pulled.and(closed) {
            log_aborted(&e);
            return Err(e);
        }

        let metrics = self.ctx.metrics().snapshot();
        log_event_with_fields(
            Event::QueryComplete,
            &[
                ("tuples", &emitted.to_string()),
                ("runs_created", &metrics.runs_created.to_string()),
            ],
        );
        scope.complete();
        Ok(metrics)
    }
}

/// Log severity of a query aborted by `err`
fn abort_severity(err: &ExecutorError) -> Severity {
    if err.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Error
    }
}

fn log_aborted(err: &ExecutorError) {
    log_event_at(
        Event::QueryAborted,
        abort_severity(err),
        &[("code", err.code().code()), ("error", &err.to_string())],
    );
}

fn drain(root: &mut dyn Operator, mut sink: impl FnMut(Batch)) -> ExecutorResult<()> {
    root.open()?;
    while let Some(batch) = root.next()? {
        sink(batch);
    }
    Ok(())
}
