//! Sort-merge equi-join
//!
//! Both inputs are sorted on their join attribute with [`ExternalSort`].
//! The sorted right side is written to a run that can be read by batch
//! number, so the merge can step back to the start of a group of equal
//! right keys when the next left tuple carries the same key.
//!
//! # Frames
//!
//! - 1 for the current left batch
//! - `B - 3` for a sliding window of consecutive right batches
//! - 1 running buffer for right batches behind the window
//! - 1 for output
//!
//! # Merge rule
//!
//! With `l` the current left tuple and `r` the current right tuple:
//!
//! - `l < r`: advance left; if a group matched, rewind right to its start
//! - `l > r`: advance right
//! - `l = r`: emit the pair, remember the group start, advance right
//!
//! When right runs out while a group is matched, left advances and right
//! rewinds to the group start. The join is done once left runs out, or
//! right runs out with no group matched.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use super::block_nested::resolve_join_keys;
use super::errors::{ExecutorError, ExecutorResult};
use super::sort::ExternalSort;
use super::{BoxedOperator, OpState, Operator};
use crate::engine::ExecutionContext;
use crate::observability::{log_event_with_fields, Event};
use crate::record::{Batch, Condition, Schema, SortKey, Tuple};
use crate::spill::{IndexedRunReader, SortedRun};

const RUN_PREFIX: &str = "smj";

/// Sequential access to the sorted left input by tuple index
struct LeftCursor {
    sort: ExternalSort,
    batch: Option<Batch>,
    /// Index of the first tuple of `batch`
    start: usize,
    exhausted: bool,
}

impl LeftCursor {
    fn new(sort: ExternalSort) -> Self {
        Self {
            sort,
            batch: None,
            start: 0,
            exhausted: false,
        }
    }

    /// Tuple at `index`. Indexes must not go backwards.
    fn tuple(&mut self, index: usize) -> ExecutorResult<Option<&Tuple>> {
        loop {
            if let Some(batch) = &self.batch {
                if index < self.start + batch.len() {
                    break;
                }
                self.start += batch.len();
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.sort.next()? {
                Some(batch) => self.batch = Some(batch),
                None => {
                    self.exhausted = true;
                    self.batch = None;
                    return Ok(None);
                }
            }
        }
        let offset = index.checked_sub(self.start).ok_or_else(|| {
            ExecutorError::invariant_violated("left cursor moved backwards")
                .in_operator("SortMergeJoin")
        })?;
        Ok(self.batch.as_ref().and_then(|b| b.get(offset)))
    }
}

/// Random access to the sorted right run through `B - 2` frames
struct RightWindow {
    reader: IndexedRunReader,
    capacity: usize,
    total: usize,
    window: VecDeque<Batch>,
    /// Batch number of `window[0]`
    window_start: usize,
    window_size: usize,
    running: Option<(usize, Batch)>,
}

impl RightWindow {
    fn new(reader: IndexedRunReader, capacity: usize, total: usize, window_size: usize) -> Self {
        Self {
            reader,
            capacity,
            total,
            window: VecDeque::with_capacity(window_size),
            window_start: 0,
            window_size,
            running: None,
        }
    }

    fn tuple(&mut self, index: usize) -> ExecutorResult<Option<&Tuple>> {
        if index >= self.total {
            return Ok(None);
        }
        let capacity = self.capacity;
        let batch = self.batch(index / capacity)?;
        Ok(batch.get(index % capacity))
    }

    fn in_window(&self, number: usize) -> bool {
        number >= self.window_start && number < self.window_start + self.window.len()
    }

    fn batch(&mut self, number: usize) -> ExecutorResult<&Batch> {
        if self.in_window(number) {
            return Ok(&self.window[number - self.window_start]);
        }

        if number < self.window_start || self.window_size == 0 {
            // Behind the window: served from the running buffer
            let cached = matches!(&self.running, Some((n, _)) if *n == number);
            if !cached {
                let batch = self.read(number)?;
                self.running = Some((number, batch));
            }
            return match &self.running {
                Some((_, batch)) => Ok(batch),
                None => Err(ExecutorError::invariant_violated("running buffer empty")),
            };
        }

        while !self.in_window(number) {
            let next = self.window_start + self.window.len();
            let batch = self.read(next)?;
            if self.window.len() == self.window_size {
                self.window.pop_front();
                self.window_start += 1;
            }
            self.window.push_back(batch);
        }
        Ok(&self.window[number - self.window_start])
    }

    fn read(&mut self, number: usize) -> ExecutorResult<Batch> {
        match self.reader.read_batch(number)? {
            Some(batch) => Ok(batch),
            None => Err(ExecutorError::invariant_violated(format!(
                "right run has no batch {}",
                number
            ))
            .in_operator("SortMergeJoin")),
        }
    }
}

/// Merge position carried between calls to `next()`
#[derive(Debug, Default)]
struct MergeState {
    left: usize,
    right: usize,
    first_match: usize,
    has_match: bool,
}

/// Equi-join of `left` and `right` by sorting both and merging
pub struct SortMergeJoin {
    left: LeftCursor,
    right_sort: Option<ExternalSort>,
    right: Option<RightWindow>,
    right_run: Option<SortedRun>,
    condition: Condition,
    keys: (usize, usize),
    num_buffers: usize,
    ctx: Arc<ExecutionContext>,
    schema: Schema,
    capacity: usize,
    merge: MergeState,
    emitted: u64,
    state: OpState,
}

impl SortMergeJoin {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        condition: Condition,
        num_buffers: usize,
        ctx: Arc<ExecutionContext>,
    ) -> ExecutorResult<Self> {
        if num_buffers < 3 {
            return Err(ExecutorError::setup_failed(format!(
                "sort merge join needs at least 3 buffers, got {}",
                num_buffers
            ))
            .in_operator("SortMergeJoin"));
        }
        let (condition, keys) = resolve_join_keys(condition, left.schema(), right.schema())
            .map_err(|e| e.in_operator("SortMergeJoin"))?;
        let schema = left.schema().join(right.schema());

        let left_key = SortKey::asc(condition.left.clone());
        let right_key = match condition.right_attribute() {
            Some(attribute) => SortKey::asc(attribute.clone()),
            None => {
                return Err(ExecutorError::setup_failed("join condition has no right attribute")
                    .in_operator("SortMergeJoin"))
            }
        };
        let left = ExternalSort::new(left, vec![left_key], num_buffers, Arc::clone(&ctx))?;
        let right = ExternalSort::new(right, vec![right_key], num_buffers, Arc::clone(&ctx))?;

        Ok(Self {
            left: LeftCursor::new(left),
            right_sort: Some(right),
            right: None,
            right_run: None,
            condition,
            keys,
            num_buffers,
            ctx,
            schema,
            capacity: 0,
            merge: MergeState::default(),
            emitted: 0,
            state: OpState::Created,
        })
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Sorts the right input and rewrites it as full pages, so batch `n`
    /// holds tuples `n * capacity ..`
    fn materialize_right(&mut self) -> ExecutorResult<(SortedRun, usize)> {
        let mut sort = self
            .right_sort
            .take()
            .ok_or_else(|| ExecutorError::execution_failed("SortMergeJoin opened twice"))?;
        let capacity = self.ctx.batch_capacity(sort.schema())?;
        sort.open()?;

        let spill = self.ctx.spill();
        let mut writer = spill.create_run(RUN_PREFIX)?;
        let mut page = Batch::new(capacity);
        let copied = (|| -> ExecutorResult<()> {
            while let Some(batch) = sort.next()? {
                for tuple in batch {
                    if page.is_full() {
                        writer.write_batch(&page)?;
                        page = Batch::new(capacity);
                    }
                    page.push(tuple)?;
                }
            }
            if !page.is_empty() {
                writer.write_batch(&page)?;
            }
            Ok(())
        })();
        if let Err(e) = copied {
            spill.abandon(writer);
            return Err(e);
        }

        let run = writer.finish()?;
        if let Err(e) = sort.close() {
            spill.discard(run);
            return Err(e);
        }
        Ok((run, capacity))
    }

    fn finish(&mut self) {
        self.state = OpState::Exhausted;
        log_event_with_fields(
            Event::JoinComplete,
            &[
                ("operator", self.name()),
                ("tuples", &self.emitted.to_string()),
            ],
        );
    }
}

impl Operator for SortMergeJoin {
    fn open(&mut self) -> ExecutorResult<()> {
        self.capacity = self.ctx.batch_capacity(&self.schema)?;

        let (run, right_capacity) = self.materialize_right()?;
        log_event_with_fields(
            Event::JoinRightMaterialized,
            &[
                ("operator", self.name()),
                ("batches", &run.batch_count().to_string()),
                ("tuples", &run.tuple_count().to_string()),
                ("bytes", &run.byte_len().to_string()),
            ],
        );
        let total = run.tuple_count();
        let reader = self.ctx.spill().open_indexed(&run);
        self.right_run = Some(run);
        self.right = Some(RightWindow::new(
            reader?,
            right_capacity,
            total,
            self.num_buffers - 3,
        ));

        self.left.sort.open()?;
        self.merge = MergeState::default();
        self.emitted = 0;
        self.state = OpState::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Batch>> {
        if !self.state.check_next(self.name())? {
            return Ok(None);
        }
        let Some(right) = self.right.as_mut() else {
            return Err(ExecutorError::not_open("SortMergeJoin"));
        };

        let (left_key, right_key) = self.keys;
        let merge = &mut self.merge;
        let mut out = Batch::new(self.capacity);
        let mut exhausted = false;

        while !out.is_full() {
            let Some(l) = self.left.tuple(merge.left)? else {
                exhausted = true;
                break;
            };
            let Some(r) = right.tuple(merge.right)? else {
                if merge.has_match {
                    merge.left += 1;
                    merge.right = merge.first_match;
                    merge.has_match = false;
                    continue;
                }
                exhausted = true;
                break;
            };

            match l.compare_across(r, left_key, right_key) {
                Ordering::Less => {
                    merge.left += 1;
                    if merge.has_match {
                        merge.right = merge.first_match;
                        merge.has_match = false;
                    }
                }
                Ordering::Greater => {
                    merge.right += 1;
                    merge.has_match = false;
                }
                Ordering::Equal => {
                    if !merge.has_match {
                        merge.first_match = merge.right;
                        merge.has_match = true;
                    }
                    out.push(l.join(r))?;
                    merge.right += 1;
                }
            }
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
        self.state = OpState::Closed;
        self.right = None;
        self.right_sort = None;
        self.left.batch = None;

        let deleted = match self.right_run.take() {
            Some(run) => self.ctx.spill().delete(run).map_err(ExecutorError::from),
            None => Ok(()),
        };
        self.left.sort.close()?;
        deleted
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "SortMergeJoin"
    }
}

impl Drop for SortMergeJoin {
    fn drop(&mut self) {
        self.right = None;
        if let Some(run) = self.right_run.take() {
            self.ctx.spill().discard(run);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{BlockNestedJoin, TableScan};
    use crate::record::{Attribute, DataType, Value};
    use tempfile::TempDir;

    fn relation(
        ctx: &Arc<ExecutionContext>,
        table: &str,
        rows: &[(i32, i32)],
    ) -> BoxedOperator {
        let schema = Schema::new(vec![
            Attribute::new(table, "k", DataType::Int),
            Attribute::new(table, "v", DataType::Int),
        ]);
        let rows = rows
            .iter()
            .map(|(k, v)| Tuple::new(vec![Value::Int(*k), Value::Int(*v)]))
            .collect();
        Box::new(TableScan::new(table, schema, Arc::new(rows), Arc::clone(ctx)))
    }

    fn on_k() -> Condition {
        Condition::join(
            Attribute::new("L", "k", DataType::Int),
            Attribute::new("R", "k", DataType::Int),
        )
    }

    fn run_join(op: &mut dyn Operator) -> Vec<Tuple> {
        op.open().unwrap();
        let mut out = Vec::new();
        while let Some(batch) = op.next().unwrap() {
            assert!(!batch.is_empty());
            out.extend(batch);
        }
        assert!(op.next().unwrap().is_none());
        op.close().unwrap();
        out
    }

    fn both(
        dir: &TempDir,
        page_size: usize,
        buffers: usize,
        left: &[(i32, i32)],
        right: &[(i32, i32)],
    ) -> (Vec<Tuple>, Vec<Tuple>) {
        let ctx = Arc::new(ExecutionContext::new(page_size, dir.path()).unwrap());
        let mut smj = SortMergeJoin::new(
            relation(&ctx, "L", left),
            relation(&ctx, "R", right),
            on_k(),
            buffers,
            Arc::clone(&ctx),
        )
        .unwrap();
        let mut bnj = BlockNestedJoin::new(
            relation(&ctx, "L", left),
            relation(&ctx, "R", right),
            on_k(),
            buffers,
            Arc::clone(&ctx),
        )
        .unwrap();
        let mut a = run_join(&mut smj);
        let mut b = run_join(&mut bnj);
        a.sort();
        b.sort();
        (a, b)
    }

    #[test]
    fn test_many_to_many_groups() {
        let dir = TempDir::new().unwrap();
        let left = [(1, 0), (2, 1), (2, 2), (2, 3), (4, 4), (5, 5)];
        let right = [(2, 10), (2, 11), (3, 12), (5, 13), (5, 14), (6, 15)];
        let (smj, bnj) = both(&dir, 32, 3, &left, &right);
        assert_eq!(smj.len(), 8);
        assert_eq!(smj, bnj);
    }

    #[test]
    fn test_group_ending_at_last_right_tuple() {
        let dir = TempDir::new().unwrap();
        let left = [(7, 0), (7, 1), (7, 2)];
        let right = [(1, 0), (7, 10), (7, 11)];
        let (smj, bnj) = both(&dir, 16, 3, &left, &right);
        assert_eq!(smj.len(), 6);
        assert_eq!(smj, bnj);
    }

    #[test]
    fn test_group_wider_than_window() {
        let dir = TempDir::new().unwrap();
        // 2 tuples per right page and a 1 batch window; the group of 6
        // equal right keys spans 3 pages
        let left: Vec<(i32, i32)> = (0..5).map(|i| (3, i)).collect();
        let mut right: Vec<(i32, i32)> = (0..6).map(|i| (3, 100 + i)).collect();
        right.push((9, 0));
        let (smj, bnj) = both(&dir, 16, 4, &left, &right);
        assert_eq!(smj.len(), 30);
        assert_eq!(smj, bnj);
    }

    #[test]
    fn test_disjoint_keys() {
        let dir = TempDir::new().unwrap();
        let (smj, _) = both(&dir, 32, 3, &[(1, 1), (3, 3)], &[(2, 2), (4, 4)]);
        assert!(smj.is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        let dir = TempDir::new().unwrap();
        let (smj, _) = both(&dir, 32, 3, &[], &[(1, 1)]);
        assert!(smj.is_empty());
        let (smj, _) = both(&dir, 32, 3, &[(1, 1)], &[]);
        assert!(smj.is_empty());
    }

    #[test]
    fn test_no_runs_left_behind() {
        let dir = TempDir::new().unwrap();
        let left: Vec<(i32, i32)> = (0..40).map(|i| (i % 6, i)).collect();
        let right: Vec<(i32, i32)> = (0..30).map(|i| (i % 4, i)).collect();
        both(&dir, 16, 3, &left, &right);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
