//! External Merge Sort Correctness Tests
//!
//! Properties:
//! - Output is a permutation of the input
//! - Output is ordered under the key sequence, per direction
//! - Tuple count is conserved across every merge round
//! - No run file outlives the operator
//!
//! Inputs cover 0 tuples, 1 tuple, exactly B pages and several multiples
//! of B pages (two or more merge rounds).

use std::sync::Arc;

use qproc::engine::ExecutionContext;
use qproc::operator::{BoxedOperator, ExternalSort, Operator, TableScan};
use qproc::record::{Attribute, DataType, Schema, SortKey, Tuple, TupleComparator, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Two int columns: 8 bytes per tuple, so a 16 byte page holds 2 tuples
const PAGE_SIZE: usize = 16;
const TUPLES_PER_PAGE: usize = 2;

fn attr(column: &str) -> Attribute {
    Attribute::new("R", column, DataType::Int)
}

fn schema() -> Schema {
    Schema::new(vec![attr("k"), attr("seq")])
}

fn random_rows(n: usize, key_range: i32, seed: u64) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            Tuple::new(vec![
                Value::Int(rng.gen_range(0..key_range)),
                Value::Int(i as i32),
            ])
        })
        .collect()
}

fn scan(ctx: &Arc<ExecutionContext>, rows: &[Tuple]) -> BoxedOperator {
    Box::new(TableScan::new(
        "R",
        schema(),
        Arc::new(rows.to_vec()),
        Arc::clone(ctx),
    ))
}

fn sort_all(
    dir: &TempDir,
    rows: &[Tuple],
    keys: Vec<SortKey>,
    buffers: usize,
) -> (Vec<Tuple>, Arc<ExecutionContext>) {
    let ctx = Arc::new(ExecutionContext::new(PAGE_SIZE, dir.path()).unwrap());
    let mut sort = ExternalSort::new(scan(&ctx, rows), keys, buffers, Arc::clone(&ctx)).unwrap();
    sort.open().unwrap();

    let mut out = Vec::new();
    while let Some(batch) = sort.next().unwrap() {
        assert!(!batch.is_empty(), "sort returned an empty batch");
        assert!(batch.len() <= TUPLES_PER_PAGE);
        out.extend(batch);
    }
    assert!(sort.next().unwrap().is_none(), "end of output must be sticky");
    sort.close().unwrap();
    (out, ctx)
}

fn assert_permutation(input: &[Tuple], output: &[Tuple]) {
    let mut a = input.to_vec();
    let mut b = output.to_vec();
    a.sort();
    b.sort();
    assert_eq!(a, b, "sort output is not a permutation of its input");
}

fn spill_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

// =============================================================================
// Input Sizes
// =============================================================================

#[test]
fn test_sort_empty_input() {
    let dir = TempDir::new().unwrap();
    let (out, ctx) = sort_all(&dir, &[], vec![SortKey::asc(attr("k"))], 3);
    assert!(out.is_empty());
    assert_eq!(ctx.metrics().snapshot().runs_created, 0);
}

#[test]
fn test_sort_single_tuple() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(1, 10, 1);
    let (out, _) = sort_all(&dir, &rows, vec![SortKey::asc(attr("k"))], 3);
    assert_eq!(out, rows);
}

#[test]
fn test_sort_exactly_b_pages() {
    let dir = TempDir::new().unwrap();
    let buffers = 4;
    let rows = random_rows(buffers * TUPLES_PER_PAGE, 100, 2);
    let keys = vec![SortKey::asc(attr("k"))];
    let (out, ctx) = sort_all(&dir, &rows, keys.clone(), buffers);

    assert_permutation(&rows, &out);
    assert!(TupleComparator::new(&keys, &schema()).unwrap().is_sorted(&out));
    // One run, nothing to merge
    let metrics = ctx.metrics().snapshot();
    assert_eq!(metrics.runs_created, 1);
    assert_eq!(metrics.merge_rounds, 0);
}

#[test]
fn test_sort_many_multiples_of_b() {
    for (buffers, multiple, seed) in [(3, 5, 10u64), (4, 9, 11), (2, 7, 12), (5, 17, 13)] {
        let dir = TempDir::new().unwrap();
        let rows = random_rows(buffers * TUPLES_PER_PAGE * multiple, 50, seed);
        let keys = vec![SortKey::asc(attr("k"))];
        let (out, ctx) = sort_all(&dir, &rows, keys.clone(), buffers);

        assert_permutation(&rows, &out);
        assert!(
            TupleComparator::new(&keys, &schema()).unwrap().is_sorted(&out),
            "unsorted output with B={}",
            buffers
        );
        let metrics = ctx.metrics().snapshot();
        assert!(metrics.runs_created as usize >= multiple);
        assert!(metrics.merge_rounds >= 2, "B={} merged in one round", buffers);
        assert_eq!(metrics.live_runs(), 0);
        assert_eq!(spill_files(&dir), 0);
    }
}

#[test]
fn test_sort_partial_last_page() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(37, 1000, 3);
    let (out, _) = sort_all(&dir, &rows, vec![SortKey::asc(attr("k"))], 3);
    assert_permutation(&rows, &out);
    assert_eq!(out.len(), 37);
}

// =============================================================================
// Key Sequences
// =============================================================================

#[test]
fn test_sort_descending() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(60, 20, 4);
    let keys = vec![SortKey::desc(attr("k"))];
    let (out, _) = sort_all(&dir, &rows, keys.clone(), 3);
    assert_permutation(&rows, &out);
    assert!(TupleComparator::new(&keys, &schema()).unwrap().is_sorted(&out));
}

#[test]
fn test_sort_secondary_key_breaks_ties() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(80, 4, 5);
    let keys = vec![SortKey::asc(attr("k")), SortKey::desc(attr("seq"))];
    let (out, _) = sort_all(&dir, &rows, keys.clone(), 3);
    assert_permutation(&rows, &out);
    assert!(TupleComparator::new(&keys, &schema()).unwrap().is_sorted(&out));
}

#[test]
fn test_sort_text_and_real_keys() {
    let dir = TempDir::new().unwrap();
    let schema = Schema::new(vec![
        Attribute::new("P", "name", DataType::Text(4)),
        Attribute::new("P", "score", DataType::Real),
    ]);
    let names = ["kiwi", "fig", "pear", "date", "lime", "plum"];
    let rows: Vec<Tuple> = (0..30)
        .map(|i| {
            Tuple::new(vec![
                Value::Text(names[i % names.len()].to_string()),
                Value::Real((i as f64) * 0.5 - 3.0),
            ])
        })
        .collect();
    let keys = vec![
        SortKey::asc(Attribute::new("P", "name", DataType::Text(4))),
        SortKey::desc(Attribute::new("P", "score", DataType::Real)),
    ];

    // 12 bytes per tuple: 2 per 24 byte page
    let ctx = Arc::new(ExecutionContext::new(24, dir.path()).unwrap());
    let source = TableScan::new("P", schema.clone(), Arc::new(rows.clone()), Arc::clone(&ctx));
    let mut sort = ExternalSort::new(Box::new(source), keys.clone(), 3, ctx).unwrap();
    sort.open().unwrap();
    let mut out = Vec::new();
    while let Some(batch) = sort.next().unwrap() {
        out.extend(batch);
    }
    sort.close().unwrap();

    assert_permutation(&rows, &out);
    assert!(TupleComparator::new(&keys, &schema).unwrap().is_sorted(&out));
    assert_eq!(out[0].value(0), &Value::Text("date".into()));
}

#[test]
fn test_sort_arbitrary_reals_bit_exact() {
    let dir = TempDir::new().unwrap();
    let schema = Schema::new(vec![
        Attribute::new("F", "x", DataType::Real),
        Attribute::new("F", "seq", DataType::Int),
    ]);
    let mut rng = StdRng::seed_from_u64(21);
    let rows: Vec<Tuple> = std::iter::repeat_with(|| f64::from_bits(rng.gen::<u64>()))
        .filter(|x| x.is_finite())
        .take(3000)
        .enumerate()
        .map(|(i, x)| Tuple::new(vec![Value::Real(x), Value::Int(i as i32)]))
        .collect();
    let keys = vec![SortKey::asc(Attribute::new("F", "x", DataType::Real))];

    // 12 bytes per tuple: 5 per 64 byte page, many runs and merge rounds
    let ctx = Arc::new(ExecutionContext::new(64, dir.path()).unwrap());
    let source = TableScan::new("F", schema.clone(), Arc::new(rows.clone()), Arc::clone(&ctx));
    let mut sort = ExternalSort::new(Box::new(source), keys.clone(), 3, Arc::clone(&ctx)).unwrap();
    sort.open().unwrap();
    let mut out = Vec::new();
    while let Some(batch) = sort.next().unwrap() {
        out.extend(batch);
    }
    sort.close().unwrap();
    assert!(ctx.metrics().snapshot().merge_rounds >= 2);

    let bits = |tuples: &[Tuple]| {
        let mut bits: Vec<(u64, Value)> = tuples
            .iter()
            .map(|t| match t.value(0) {
                Value::Real(x) => (x.to_bits(), t.value(1).clone()),
                other => panic!("expected a real, got {:?}", other),
            })
            .collect();
        bits.sort();
        bits
    };
    assert_eq!(bits(&out), bits(&rows), "spilled reals changed");
    assert!(TupleComparator::new(&keys, &schema).unwrap().is_sorted(&out));
}

// =============================================================================
// Tuple Conservation
// =============================================================================

#[test]
fn test_sort_conserves_tuple_count() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(250, 7, 6);
    let (out, ctx) = sort_all(&dir, &rows, vec![SortKey::asc(attr("k"))], 3);
    let metrics = ctx.metrics().snapshot();
    assert_eq!(out.len(), rows.len());
    assert_eq!(metrics.tuples_sorted as usize, rows.len());
}

#[test]
fn test_sort_is_stable_across_merges() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(120, 3, 7);
    let (out, _) = sort_all(&dir, &rows, vec![SortKey::asc(attr("k"))], 3);
    // Within one key, the input sequence number must still ascend
    let by_key_then_seq = TupleComparator::new(
        &[SortKey::asc(attr("k")), SortKey::asc(attr("seq"))],
        &schema(),
    )
    .unwrap();
    assert!(by_key_then_seq.is_sorted(&out));
}

// =============================================================================
// Cleanup
// =============================================================================

#[test]
fn test_sort_dropped_mid_stream_leaves_no_runs() {
    let dir = TempDir::new().unwrap();
    let ctx = Arc::new(ExecutionContext::new(PAGE_SIZE, dir.path()).unwrap());
    let rows = random_rows(100, 50, 8);
    let mut sort = ExternalSort::new(
        scan(&ctx, &rows),
        vec![SortKey::asc(attr("k"))],
        3,
        Arc::clone(&ctx),
    )
    .unwrap();
    sort.open().unwrap();
    sort.next().unwrap();
    drop(sort);
    assert_eq!(spill_files(&dir), 0);
    assert_eq!(ctx.metrics().snapshot().live_runs(), 0);
}
