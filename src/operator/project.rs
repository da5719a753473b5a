//! Projection onto a list of attributes

use std::collections::VecDeque;
use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};
use super::{BoxedOperator, OpState, Operator};
use crate::engine::ExecutionContext;
use crate::record::{Attribute, Batch, Schema, Tuple};

/// Keeps the listed attributes, in list order. Duplicates are not removed.
pub struct Project {
    input: BoxedOperator,
    schema: Schema,
    positions: Vec<usize>,
    ctx: Arc<ExecutionContext>,
    capacity: usize,
    pending: VecDeque<Tuple>,
    state: OpState,
}

impl Project {
    pub fn new(
        input: BoxedOperator,
        attributes: &[Attribute],
        ctx: Arc<ExecutionContext>,
    ) -> ExecutorResult<Self> {
        let setup = |e: crate::record::RecordError| {
            ExecutorError::setup_failed(e.to_string()).in_operator("Project")
        };
        let positions = attributes
            .iter()
            .map(|a| input.schema().position(a))
            .collect::<Result<Vec<_>, _>>()
            .map_err(setup)?;
        let schema = input.schema().project(attributes).map_err(setup)?;
        Ok(Self {
            input,
            schema,
            positions,
            ctx,
            capacity: 0,
            pending: VecDeque::new(),
            state: OpState::Created,
        })
    }
}

impl Operator for Project {
    fn open(&mut self) -> ExecutorResult<()> {
        self.capacity = self.ctx.batch_capacity(&self.schema)?;
        self.input.open()?;
        self.pending.clear();
        self.state = OpState::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Batch>> {
        if !self.state.check_next(self.name())? {
            return Ok(None);
        }

        let mut out = Batch::new(self.capacity);
        loop {
            while !out.is_full() {
                match self.pending.pop_front() {
                    Some(tuple) => out.push(tuple)?,
                    None => break,
                }
            }
            if out.is_full() {
                break;
            }
            match self.input.next()? {
                Some(batch) => {
                    let positions = &self.positions;
                    self.pending
                        .extend(batch.iter().map(|t| t.project(positions)));
                }
                None => {
                    self.state = OpState::Exhausted;
                    break;
                }
            }
        }

        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        if self.state == OpState::Closed {
            return Ok(());
        }
        self.pending.clear();
        self.state = OpState::Closed;
        self.input.close()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "Project"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::TableScan;
    use crate::record::{DataType, Value};
    use tempfile::TempDir;

    fn attr(column: &str) -> Attribute {
        Attribute::new("R", column, DataType::Int)
    }

    #[test]
    fn test_reorders_and_narrows() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(ExecutionContext::new(24, dir.path()).unwrap());
        let schema = Schema::new(vec![attr("a"), attr("b"), attr("c")]);
        let rows = (0..7)
            .map(|i| Tuple::new(vec![Value::Int(i), Value::Int(i * 10), Value::Int(i * 100)]))
            .collect();
        let scan = TableScan::new("R", schema, Arc::new(rows), Arc::clone(&ctx));

        let mut op = Project::new(Box::new(scan), &[attr("c"), attr("a")], ctx).unwrap();
        assert_eq!(op.schema().len(), 2);

        op.open().unwrap();
        let mut out = Vec::new();
        while let Some(batch) = op.next().unwrap() {
            assert!(batch.len() <= 3);
            out.extend(batch);
        }
        op.close().unwrap();

        assert_eq!(out.len(), 7);
        assert_eq!(out[2].values(), &[Value::Int(200), Value::Int(2)]);
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = Arc::new(ExecutionContext::new(24, dir.path()).unwrap());
        let schema = Schema::new(vec![attr("a")]);
        let scan = TableScan::new("R", schema, Arc::new(Vec::new()), Arc::clone(&ctx));
        assert!(Project::new(Box::new(scan), &[attr("z")], ctx).is_err());
    }
}
