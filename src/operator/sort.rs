//! External merge sort
//!
//! # Algorithm
//!
//! 1. Run generation: read up to `B` input batches, sort them in memory,
//!    write them as one sorted run. Repeat until the input is exhausted.
//! 2. Merge: while more than one run remains, merge groups of `B - 1` runs
//!    (one input frame each, one output frame) into a new run. A group with
//!    a single run is carried into the next round as is.
//! 3. Stream the final run to the parent one batch per `next()`.
//!
//! # Invariants
//!
//! - Every merge preserves the tuple count of its inputs
//! - On equal keys the merge emits from the earliest input run first
//! - Runs are deleted once merged, and any remaining run on close or drop

use std::cmp::Ordering;
use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};
use super::{BoxedOperator, OpState, Operator};
use crate::engine::ExecutionContext;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::record::{Batch, Schema, SortKey, Tuple, TupleComparator};
use crate::spill::{RunReader, RunWriter, SortedRun};

const RUN_PREFIX: &str = "sort";

/// Sorts its input by `keys` using at most `num_buffers` in-memory batches
pub struct ExternalSort {
    source: BoxedOperator,
    keys: Vec<SortKey>,
    comparator: TupleComparator,
    num_buffers: usize,
    ctx: Arc<ExecutionContext>,
    schema: Schema,
    runs: Vec<SortedRun>,
    cursor: Option<RunReader>,
    input_tuples: usize,
    state: OpState,
}

impl ExternalSort {
    pub fn new(
        source: BoxedOperator,
        keys: Vec<SortKey>,
        num_buffers: usize,
        ctx: Arc<ExecutionContext>,
    ) -> ExecutorResult<Self> {
        if num_buffers < 2 {
            return Err(ExecutorError::setup_failed(format!(
                "external sort needs at least 2 buffers, got {}",
                num_buffers
            ))
            .in_operator("ExternalSort"));
        }
        let schema = source.schema().clone();
        let comparator = TupleComparator::new(&keys, &schema)
            .map_err(|e| ExecutorError::setup_failed(e.to_string()).in_operator("ExternalSort"))?;
        Ok(Self {
            source,
            keys,
            comparator,
            num_buffers,
            ctx,
            schema,
            runs: Vec::new(),
            cursor: None,
            input_tuples: 0,
            state: OpState::Created,
        })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Runs currently held (at most one once open has completed)
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Tuples consumed from the input
    pub fn input_tuples(&self) -> usize {
        self.input_tuples
    }

    /// Runs merged per group: every frame but the output one, never below two
    fn fan_in(&self) -> usize {
        (self.num_buffers - 1).max(2)
    }

    fn generate_runs(&mut self, capacity: usize) -> ExecutorResult<()> {
        let spill = self.ctx.spill();
        loop {
            let mut tuples = Vec::new();
            let mut pulled = 0;
            while pulled < self.num_buffers {
                match self.source.next()? {
                    Some(batch) => {
                        pulled += 1;
                        tuples.extend(batch);
                    }
                    None => break,
                }
            }
            if pulled == 0 {
                return Ok(());
            }

            tuples.sort_by(|a, b| self.comparator.compare(a, b));
            self.input_tuples += tuples.len();

            let mut writer = spill.create_run(RUN_PREFIX)?;
            if let Err(e) = write_all(&mut writer, Batch::chunk(tuples, capacity)) {
                spill.abandon(writer);
                return Err(e);
            }
            self.runs.push(writer.finish()?);
        }
    }

    fn merge_runs(&mut self, capacity: usize) -> ExecutorResult<()> {
        let mut round = 0u64;
        while self.runs.len() > 1 {
            round += 1;
            let runs_in = self.runs.len();
            let before: usize = self.runs.iter().map(SortedRun::tuple_count).sum();

            let taken = std::mem::take(&mut self.runs);
            let (survivors, outcome) = self.merge_round(taken, capacity);
            self.runs = survivors;
            outcome?;

            let after: usize = self.runs.iter().map(SortedRun::tuple_count).sum();
            if before != after {
                return Err(ExecutorError::invariant_violated(format!(
                    "merge round {} produced {} tuples from {}",
                    round, after, before
                ))
                .in_operator("ExternalSort"));
            }

            self.ctx.metrics().increment_merge_rounds();
            log_event_with_fields(
                Event::SortMergeRound,
                &[
                    ("round", &round.to_string()),
                    ("runs_in", &runs_in.to_string()),
                    ("runs_out", &self.runs.len().to_string()),
                ],
            );
        }
        Ok(())
    }

    /// Merges `runs` in groups of `fan_in`.
    ///
    /// Always hands back every run file that still exists, so a failed round
    /// leaves nothing behind that close cannot find.
    fn merge_round(
        &self,
        runs: Vec<SortedRun>,
        capacity: usize,
    ) -> (Vec<SortedRun>, ExecutorResult<()>) {
        let spill = self.ctx.spill();
        let fan_in = self.fan_in();
        let mut survivors = Vec::with_capacity(runs.len() / fan_in + 1);
        let mut pending = runs.into_iter();

        loop {
            let group: Vec<SortedRun> = pending.by_ref().take(fan_in).collect();
            if group.len() <= 1 {
                // Fewer than two runs left: carry over untouched
                survivors.extend(group);
                return (survivors, Ok(()));
            }

            match self.merge_group(&group, capacity) {
                Ok(merged) => survivors.push(merged),
                Err(e) => {
                    survivors.extend(group);
                    survivors.extend(pending);
                    return (survivors, Err(e));
                }
            }

            let mut consumed = group.into_iter();
            while let Some(run) = consumed.next() {
                if let Err(e) = spill.delete(run) {
                    survivors.extend(consumed);
                    survivors.extend(pending);
                    return (survivors, Err(e.into()));
                }
            }
        }
    }

    /// k-way merge of `group` into a single new run
    fn merge_group(&self, group: &[SortedRun], capacity: usize) -> ExecutorResult<SortedRun> {
        let spill = self.ctx.spill();
        let mut inputs = Vec::with_capacity(group.len());
        for run in group {
            inputs.push(MergeInput::open(spill.open_run(run)?)?);
        }

        let mut writer = spill.create_run(RUN_PREFIX)?;
        if let Err(e) = self.merge_into(&mut inputs, &mut writer, capacity) {
            spill.abandon(writer);
            return Err(e);
        }
        let merged = writer.finish()?;

        let expected: usize = group.iter().map(SortedRun::tuple_count).sum();
        if merged.tuple_count() != expected {
            let found = merged.tuple_count();
            spill.discard(merged);
            return Err(ExecutorError::invariant_violated(format!(
                "merge wrote {} tuples, inputs held {}",
                found, expected
            ))
            .in_operator("ExternalSort"));
        }
        Ok(merged)
    }

    fn merge_into(
        &self,
        inputs: &mut [MergeInput],
        writer: &mut RunWriter,
        capacity: usize,
    ) -> ExecutorResult<()> {
        let mut output = Batch::new(capacity);
        loop {
            // Strictly-less keeps the earliest input on ties
            let mut smallest: Option<(usize, &Tuple)> = None;
            for (i, input) in inputs.iter().enumerate() {
                if let Some(head) = input.head() {
                    let better = match smallest {
                        None => true,
                        Some((_, best)) => self.comparator.compare(head, best) == Ordering::Less,
                    };
                    if better {
                        smallest = Some((i, head));
                    }
                }
            }
            let Some((index, _)) = smallest else {
                break;
            };

            if let Some(tuple) = inputs[index].advance()? {
                output.push(tuple)?;
            }
            if output.is_full() {
                writer.write_batch(&output)?;
                output = Batch::new(capacity);
            }
        }

        if !output.is_empty() {
            writer.write_batch(&output)?;
        }
        Ok(())
    }

    fn delete_runs(&mut self) -> ExecutorResult<()> {
        let spill = self.ctx.spill();
        let mut first_error = None;
        for run in self.runs.drain(..) {
            if let Err(e) = spill.delete(run) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn write_all(writer: &mut RunWriter, batches: Vec<Batch>) -> ExecutorResult<()> {
    for batch in &batches {
        writer.write_batch(batch)?;
    }
    Ok(())
}

/// One run being merged: the current batch plus the next tuple to emit
struct MergeInput {
    reader: RunReader,
    current: std::vec::IntoIter<Tuple>,
    head: Option<Tuple>,
}

impl MergeInput {
    fn open(reader: RunReader) -> ExecutorResult<Self> {
        let mut input = Self {
            reader,
            current: Vec::new().into_iter(),
            head: None,
        };
        input.head = input.pull()?;
        Ok(input)
    }

    fn head(&self) -> Option<&Tuple> {
        self.head.as_ref()
    }

    /// Takes the head tuple and loads the one after it
    fn advance(&mut self) -> ExecutorResult<Option<Tuple>> {
        let next = self.pull()?;
        Ok(std::mem::replace(&mut self.head, next))
    }

    fn pull(&mut self) -> ExecutorResult<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Ok(Some(tuple));
            }
            match self.reader.next_batch()? {
                Some(batch) => self.current = batch.into_tuples().into_iter(),
                None => return Ok(None),
            }
        }
    }
}

impl Operator for ExternalSort {
    fn open(&mut self) -> ExecutorResult<()> {
        let capacity = self.ctx.batch_capacity(&self.schema)?;
        self.source.open()?;

        let buffers = self.num_buffers.to_string();
        let scope = ObservationScope::with_fields("SORT", &[("buffers", &buffers)]);

        let generated = self.generate_runs(capacity);
        let closed = self.source.close();
        generated?;
        closed?;

        log_event_with_fields(
            Event::SortRunsGenerated,
            &[
                ("runs", &self.runs.len().to_string()),
                ("tuples", &self.input_tuples.to_string()),
            ],
        );

        self.merge_runs(capacity)?;
        self.ctx.metrics().add_tuples_sorted(self.input_tuples as u64);

        self.cursor = match self.runs.first() {
            Some(run) => Some(self.ctx.spill().open_run(run)?),
            None => None,
        };
        self.state = OpState::Open;

        log_event_with_fields(
            Event::SortComplete,
            &[("tuples", &self.input_tuples.to_string())],
        );
        scope.complete();
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Batch>> {
        if !self.state.check_next(self.name())? {
            return Ok(None);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            self.state = OpState::Exhausted;
            return Ok(None);
        };
        loop {
            match cursor.next_batch()? {
                Some(batch) if batch.is_empty() => continue,
                Some(batch) => return Ok(Some(batch)),
                None => {
                    self.state = OpState::Exhausted;
                    return Ok(None);
                }
            }
        }
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.cursor = None;
        self.state = OpState::Closed;
        self.delete_runs()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "ExternalSort"
    }
}

impl Drop for ExternalSort {
    fn drop(&mut self) {
        self.cursor = None;
        let spill = self.ctx.spill();
        for run in self.runs.drain(..) {
            spill.discard(run);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::TableScan;
    use crate::record::{Attribute, DataType, Value};
    use tempfile::TempDir;

    fn attr(column: &str) -> Attribute {
        Attribute::new("R", column, DataType::Int)
    }

    fn setup(
        dir: &TempDir,
        rows: Vec<(i32, i32)>,
        page_size: usize,
    ) -> (Arc<ExecutionContext>, BoxedOperator) {
        let ctx = Arc::new(ExecutionContext::new(page_size, dir.path()).unwrap());
        let schema = Schema::new(vec![attr("k"), attr("v")]);
        let rows = rows
            .into_iter()
            .map(|(k, v)| Tuple::new(vec![Value::Int(k), Value::Int(v)]))
            .collect();
        let scan = TableScan::new("R", schema, Arc::new(rows), Arc::clone(&ctx));
        (ctx, Box::new(scan))
    }

    fn drain(op: &mut ExternalSort) -> Vec<Tuple> {
        let mut out = Vec::new();
        while let Some(batch) = op.next().unwrap() {
            out.extend(batch);
        }
        out
    }

    fn ints(tuples: &[Tuple], index: usize) -> Vec<i32> {
        tuples
            .iter()
            .map(|t| match t.value(index) {
                Value::Int(v) => *v,
                _ => unreachable!(),
            })
            .collect()
    }

    fn spill_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_sorts_across_many_runs() {
        let dir = TempDir::new().unwrap();
        // 2 tuples per page, 3 buffers: runs of 6, merged 2 at a time
        let rows = (0..50).map(|i| ((i * 37) % 50, i)).collect();
        let (ctx, source) = setup(&dir, rows, 16);
        let mut sort = ExternalSort::new(source, vec![SortKey::asc(attr("k"))], 3, Arc::clone(&ctx))
            .unwrap();
        sort.open().unwrap();
        assert_eq!(sort.run_count(), 1);
        assert!(ctx.metrics().merge_rounds() >= 3);

        let out = drain(&mut sort);
        assert_eq!(ints(&out, 0), (0..50).collect::<Vec<_>>());
        sort.close().unwrap();
        assert_eq!(spill_files(&dir), 0);
    }

    #[test]
    fn test_two_buffers_still_progress() {
        let dir = TempDir::new().unwrap();
        let rows = (0..20).rev().map(|i| (i, i)).collect();
        let (ctx, source) = setup(&dir, rows, 8);
        let mut sort =
            ExternalSort::new(source, vec![SortKey::asc(attr("k"))], 2, ctx).unwrap();
        sort.open().unwrap();
        assert_eq!(ints(&drain(&mut sort), 0), (0..20).collect::<Vec<_>>());
        sort.close().unwrap();
    }

    #[test]
    fn test_descending_with_secondary_key() {
        let dir = TempDir::new().unwrap();
        let rows = vec![(1, 5), (2, 1), (1, 3), (2, 9), (1, 4)];
        let (ctx, source) = setup(&dir, rows, 8);
        let keys = vec![SortKey::desc(attr("k")), SortKey::asc(attr("v"))];
        let mut sort = ExternalSort::new(source, keys, 2, ctx).unwrap();
        sort.open().unwrap();
        let out = drain(&mut sort);
        assert_eq!(ints(&out, 0), vec![2, 2, 1, 1, 1]);
        assert_eq!(ints(&out, 1), vec![1, 9, 3, 4, 5]);
        sort.close().unwrap();
    }

    #[test]
    fn test_equal_keys_keep_input_order() {
        let dir = TempDir::new().unwrap();
        // Every key equal: output must follow input order across runs
        let rows = (0..30).map(|i| (7, i)).collect();
        let (ctx, source) = setup(&dir, rows, 16);
        let mut sort =
            ExternalSort::new(source, vec![SortKey::asc(attr("k"))], 3, ctx).unwrap();
        sort.open().unwrap();
        assert_eq!(ints(&drain(&mut sort), 1), (0..30).collect::<Vec<_>>());
        sort.close().unwrap();
    }

    #[test]
    fn test_empty_input() {
        let dir = TempDir::new().unwrap();
        let (ctx, source) = setup(&dir, vec![], 16);
        let mut sort =
            ExternalSort::new(source, vec![SortKey::asc(attr("k"))], 3, ctx).unwrap();
        sort.open().unwrap();
        assert_eq!(sort.run_count(), 0);
        assert!(sort.next().unwrap().is_none());
        assert!(sort.next().unwrap().is_none());
        sort.close().unwrap();
    }

    #[test]
    fn test_single_run_needs_no_merge() {
        let dir = TempDir::new().unwrap();
        let rows = vec![(3, 0), (1, 0), (2, 0)];
        let (ctx, source) = setup(&dir, rows, 64);
        let mut sort = ExternalSort::new(
            source,
            vec![SortKey::asc(attr("k"))],
            4,
            Arc::clone(&ctx),
        )
        .unwrap();
        sort.open().unwrap();
        assert_eq!(ctx.metrics().merge_rounds(), 0);
        assert_eq!(ints(&drain(&mut sort), 0), vec![1, 2, 3]);
        sort.close().unwrap();
    }

    #[test]
    fn test_rejects_one_buffer() {
        let dir = TempDir::new().unwrap();
        let (ctx, source) = setup(&dir, vec![], 16);
        assert!(ExternalSort::new(source, vec![SortKey::asc(attr("k"))], 1, ctx).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let (ctx, source) = setup(&dir, vec![], 16);
        let key = SortKey::asc(Attribute::new("S", "x", DataType::Int));
        assert!(ExternalSort::new(source, vec![key], 3, ctx).is_err());
    }

    #[test]
    fn test_drop_without_close_deletes_runs() {
        let dir = TempDir::new().unwrap();
        let rows = (0..40).map(|i| (40 - i, i)).collect();
        let (ctx, source) = setup(&dir, rows, 16);
        let mut sort =
            ExternalSort::new(source, vec![SortKey::asc(attr("k"))], 3, ctx).unwrap();
        sort.open().unwrap();
        sort.next().unwrap();
        assert!(spill_files(&dir) > 0);
        drop(sort);
        assert_eq!(spill_files(&dir), 0);
    }
}
