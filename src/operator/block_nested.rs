//! Block-nested-loop equi-join
//!
//! # Algorithm
//!
//! 1. On open, the right input is drained into a run file and closed.
//! 2. Up to `B - 2` left batches form a block held in memory.
//! 3. The right run is scanned one batch at a time; every left tuple in the
//!    block is compared against every tuple of that batch.
//! 4. When the right run is exhausted the next block is read and the run
//!    rewound.
//!
//! Frames: `B - 2` for the block, one for the right batch, one for output.
//!
//! # Resumption
//!
//! `next()` stops as soon as the output batch is full. The block, the right
//! batch and both positions are kept, so the following call continues at
//! the pair after the last one emitted. Every matching pair is emitted
//! exactly once.

use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};
use super::{BoxedOperator, OpState, Operator};
use crate::engine::ExecutionContext;
use crate::observability::{log_event_with_fields, Event};
use crate::record::{Batch, Condition, RecordResult, Schema, Tuple};
use crate::spill::{RunReader, SortedRun};

const RUN_PREFIX: &str = "bnj";

/// Where the join loop stands between calls to `next()`
#[derive(Default)]
struct BlockCursor {
    block: Vec<Tuple>,
    right: Option<Batch>,
    left_pos: usize,
    right_pos: usize,
}

impl BlockCursor {
    fn with_block(block: Vec<Tuple>) -> Self {
        Self {
            block,
            ..Self::default()
        }
    }

    /// Pairs the block with the current right batch until `out` fills.
    ///
    /// Returns `true` if it stopped because `out` is full.
    fn scan(&mut self, keys: (usize, usize), out: &mut Batch) -> RecordResult<bool> {
        let Some(right) = self.right.as_ref() else {
            return Ok(false);
        };
        while self.left_pos < self.block.len() {
            let left = &self.block[self.left_pos];
            while self.right_pos < right.len() {
                let candidate = &right.tuples()[self.right_pos];
                self.right_pos += 1;
                if left.joins_with(candidate, keys.0, keys.1) {
                    out.push(left.join(candidate))?;
                    if out.is_full() {
                        return Ok(true);
                    }
                }
            }
            self.right_pos = 0;
            self.left_pos += 1;
        }
        Ok(false)
    }
}

/// Equi-join of `left` and `right` in `num_buffers` frames
pub struct BlockNestedJoin {
    left: BoxedOperator,
    right: BoxedOperator,
    condition: Condition,
    keys: (usize, usize),
    num_buffers: usize,
    ctx: Arc<ExecutionContext>,
    schema: Schema,
    capacity: usize,
    right_run: Option<SortedRun>,
    right_reader: Option<RunReader>,
    cursor: BlockCursor,
    emitted: u64,
    state: OpState,
}

impl BlockNestedJoin {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        condition: Condition,
        num_buffers: usize,
        ctx: Arc<ExecutionContext>,
    ) -> ExecutorResult<Self> {
        if num_buffers < 3 {
            return Err(ExecutorError::setup_failed(format!(
                "block nested join needs at least 3 buffers, got {}",
                num_buffers
            ))
            .in_operator("BlockNestedJoin"));
        }
        let (condition, keys) = resolve_join_keys(condition, left.schema(), right.schema())
            .map_err(|e| e.in_operator("BlockNestedJoin"))?;
        let schema = left.schema().join(right.schema());
        Ok(Self {
            left,
            right,
            condition,
            keys,
            num_buffers,
            ctx,
            schema,
            capacity: 0,
            right_run: None,
            right_reader: None,
            cursor: BlockCursor::default(),
            emitted: 0,
            state: OpState::Created,
        })
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Left batches per block
    fn block_batches(&self) -> usize {
        self.num_buffers - 2
    }

    fn materialize_right(&mut self) -> ExecutorResult<SortedRun> {
        let spill = self.ctx.spill();
        self.right.open()?;
        let mut writer = spill.create_run(RUN_PREFIX)?;
        loop {
            match self.right.next() {
                Ok(Some(batch)) => {
                    if let Err(e) = writer.write_batch(&batch) {
                        spill.abandon(writer);
                        return Err(e.into());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    spill.abandon(writer);
                    return Err(e);
                }
            }
        }
        let run = writer.finish()?;
        if let Err(e) = self.right.close() {
            spill.discard(run);
            return Err(e);
        }
        Ok(run)
    }

    /// Reads the next left block and rewinds the right run.
    ///
    /// Returns `false` once the left input is exhausted.
    fn load_block(&mut self) -> ExecutorResult<bool> {
        let mut block = Vec::new();
        let mut pulled = 0;
        while pulled < self.block_batches() {
            match self.left.next()? {
                Some(batch) => {
                    pulled += 1;
                    block.extend(batch);
                }
                None => break,
            }
        }
        if block.is_empty() {
            return Ok(false);
        }
        if let Some(reader) = self.right_reader.as_mut() {
            reader.rewind()?;
        }
        self.cursor = BlockCursor::with_block(block);
        Ok(true)
    }

    fn finish(&mut self) {
        self.state = OpState::Exhausted;
        self.cursor = BlockCursor::default();
        log_event_with_fields(
            Event::JoinComplete,
            &[
                ("operator", self.name()),
                ("tuples", &self.emitted.to_string()),
            ],
        );
    }
}

/// Positions of the join attributes in the left and right schemas.
///
/// Accepts the condition written either way round and returns it oriented
/// left-to-right.
pub(crate) fn resolve_join_keys(
    condition: Condition,
    left: &Schema,
    right: &Schema,
) -> ExecutorResult<(Condition, (usize, usize))> {
    if !condition.is_equi_join() {
        return Err(ExecutorError::setup_failed(format!(
            "not an equi-join condition: {}",
            condition
        )));
    }
    let oriented = match condition.right_attribute() {
        Some(r) if left.contains(&condition.left) && right.contains(r) => condition,
        Some(r) if right.contains(&condition.left) && left.contains(r) => condition.flipped(),
        _ => {
            return Err(ExecutorError::setup_failed(format!(
                "join condition {} does not span the two inputs",
                condition
            )))
        }
    };
    let left_key = left.position(&oriented.left)?;
    let right_key = match oriented.right_attribute() {
        Some(r) => right.position(r)?,
        None => return Err(ExecutorError::setup_failed("join condition has no right attribute")),
    };
    Ok((oriented, (left_key, right_key)))
}

impl Operator for BlockNestedJoin {
    fn open(&mut self) -> ExecutorResult<()> {
        self.capacity = self.ctx.batch_capacity(&self.schema)?;

        let run = self.materialize_right()?;
        log_event_with_fields(
            Event::JoinRightMaterialized,
            &[
                ("operator", self.name()),
                ("batches", &run.batch_count().to_string()),
                ("tuples", &run.tuple_count().to_string()),
                ("bytes", &run.byte_len().to_string()),
            ],
        );
        let empty_right = run.is_empty();
        let reader = self.ctx.spill().open_run(&run);
        self.right_run = Some(run);
        self.right_reader = Some(reader?);

        self.left.open()?;
        self.cursor = BlockCursor::default();
        self.emitted = 0;
        self.state = OpState::Open;

        // No right tuples, nothing can match
        if empty_right {
            self.finish();
        }
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Batch>> {
        if !self.state.check_next(self.name())? {
            return Ok(None);
        }

        let mut out = Batch::new(self.capacity);
        let mut exhausted = false;
        loop {
            if self.cursor.block.is_empty() && !self.load_block()? {
                exhausted = true;
                break;
            }
            if self.cursor.right.is_none() {
                let reader = self
                    .right_reader
                    .as_mut()
                    .ok_or_else(|| ExecutorError::not_open("BlockNestedJoin"))?;
                match reader.next_batch()? {
                    Some(batch) => {
                        self.cursor.right = Some(batch);
                        self.cursor.left_pos = 0;
                        self.cursor.right_pos = 0;
                    }
                    None => {
                        // Block done against the whole right run
                        self.cursor.block.clear();
                        continue;
                    }
                }
            }
            if self.cursor.scan(self.keys, &mut out)? {
                break;
            }
            self.cursor.right = None;
        }

        self.emitted += out.len() as u64;
        self.ctx.metrics().add_join_output(out.len() as u64);
        if exhausted {
            self.finish();
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
        let was_opened = self.state != OpState::Created;
        self.state = OpState::Closed;
        self.cursor = BlockCursor::default();
        self.right_reader = None;

        let deleted = match self.right_run.take() {
            Some(run) => self.ctx.spill().delete(run).map_err(ExecutorError::from),
            None => Ok(()),
        };
        if was_opened {
            self.left.close()?;
        }
        deleted
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "BlockNestedJoin"
    }
}

impl Drop for BlockNestedJoin {
    fn drop(&mut self) {
        self.right_reader = None;
        if let Some(run) = self.right_run.take() {
            self.ctx.spill().discard(run);
        }
    }
}
