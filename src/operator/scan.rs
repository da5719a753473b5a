//! Table scan over an in-memory base relation

use std::sync::Arc;

use super::errors::ExecutorResult;
use super::{OpState, Operator};
use crate::engine::ExecutionContext;
use crate::record::{Batch, Schema, Tuple};

/// Emits a stored relation one page at a time
pub struct TableScan {
    relation: String,
    schema: Schema,
    rows: Arc<Vec<Tuple>>,
    ctx: Arc<ExecutionContext>,
    capacity: usize,
    position: usize,
    state: OpState,
}

impl TableScan {
    pub fn new(
        relation: impl Into<String>,
        schema: Schema,
        rows: Arc<Vec<Tuple>>,
        ctx: Arc<ExecutionContext>,
    ) -> Self {
        Self {
            relation: relation.into(),
            schema,
            rows,
            ctx,
            capacity: 0,
            position: 0,
            state: OpState::Created,
        }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }
}

impl Operator for TableScan {
    fn open(&mut self) -> ExecutorResult<()> {
        self.capacity = self.ctx.batch_capacity(&self.schema)?;
        self.position = 0;
        self.state = OpState::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Batch>> {
        if !self.state.check_next(self.name())? {
            return Ok(None);
        }
        if self.position >= self.rows.len() {
            self.state = OpState::Exhausted;
            return Ok(None);
        }

        let end = (self.position + self.capacity).min(self.rows.len());
        let mut batch = Batch::new(self.capacity);
        for tuple in &self.rows[self.position..end] {
            batch.push(tuple.clone())?;
        }
        self.position = end;
        Ok(Some(batch))
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.state = OpState::Closed;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "TableScan"
    }
}
