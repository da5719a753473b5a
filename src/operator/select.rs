//! Selection: filters its input by a single condition

use std::collections::VecDeque;
use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};
use super::{BoxedOperator, OpState, Operator};
use crate::engine::ExecutionContext;
use crate::record::{Batch, Condition, Operand, Schema, Tuple, Value};

/// Right-hand side of the predicate, resolved against the input schema
enum Rhs {
    Literal(Value),
    Column(usize),
}

/// Streams input tuples satisfying `condition`, repacked into full pages
pub struct Select {
    input: BoxedOperator,
    condition: Condition,
    left: usize,
    rhs: Rhs,
    ctx: Arc<ExecutionContext>,
    capacity: usize,
    pending: VecDeque<Tuple>,
    state: OpState,
}

impl Select {
    pub fn new(
        input: BoxedOperator,
        condition: Condition,
        ctx: Arc<ExecutionContext>,
    ) -> ExecutorResult<Self> {
        let schema = input.schema();
        let left = schema
            .position(&condition.left)
            .map_err(|e| ExecutorError::setup_failed(e.to_string()).in_operator("Select"))?;
        let rhs = match &condition.right {
            Operand::Literal(value) => Rhs::Literal(value.clone()),
            Operand::Attribute(attribute) => Rhs::Column(
                schema
                    .position(attribute)
                    .map_err(|e| ExecutorError::setup_failed(e.to_string()).in_operator("Select"))?,
            ),
        };
        Ok(Self {
            input,
            condition,
            left,
            rhs,
            ctx,
            capacity: 0,
            pending: VecDeque::new(),
            state: OpState::Created,
        })
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    fn matches(&self, tuple: &Tuple) -> bool {
        let lhs = tuple.value(self.left);
        let ordering = match &self.rhs {
            Rhs::Literal(value) => lhs.compare(value),
            Rhs::Column(index) => lhs.compare(tuple.value(*index)),
        };
        self.condition.op.holds(ordering)
    }
}

impl Operator for Select {
    fn open(&mut self) -> ExecutorResult<()> {
        self.capacity = self.ctx.batch_capacity(self.input.schema())?;
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
                    let kept: Vec<Tuple> =
                        batch.into_iter().filter(|t| self.matches(t)).collect();
                    self.pending.extend(kept);
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
        self.input.schema()
    }

    fn name(&self) -> &'static str {
        "Select"
    }
}
