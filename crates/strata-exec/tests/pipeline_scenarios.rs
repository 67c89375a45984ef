//! End-to-end scenarios for the page-frame pipeline.
//!
//! Each test builds an in-memory table, runs a filtered scan through the
//! full dispatch → reduce → collect → cleanup pipeline and checks row
//! content, ordering, counters and resource release.

use std::sync::Arc;

use strata_exec::{
    ExecConfig, ExecutionContext, FilterAtom, FilterReducer, FilterScan, FrameSequence,
    MessageBus, ReduceAtom, ScanCursor, WorkerPool, predicate,
};
use strata_ring::ScSubscriber;
use strata_storage::{ColumnKind, ColumnMeta, MemTable, MemTableFactory};

/// Single-partition table: column `x` = row index, column `ts` ascending.
fn table_of(rows: i64) -> Arc<MemTable> {
    MemTable::builder(vec![
        ColumnMeta::new("x", ColumnKind::Long),
        ColumnMeta::new("ts", ColumnKind::Timestamp),
    ])
    .partition(vec![(0..rows).collect(), (0..rows).collect()])
    .unwrap()
    .build()
}

fn collect_ts(cursor: &mut ScanCursor) -> Vec<i64> {
    let mut out = Vec::new();
    while cursor.has_next() {
        out.push(cursor.record().get_long(1));
    }
    out
}

#[test]
fn test_small_table_always_true_emits_all_rows_in_order() {
    let bus = MessageBus::new(ExecConfig::try_new(1, 64, 32, 4).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 4, 1).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 4, 42);

    let factory = Arc::new(MemTableFactory::new(table_of(5), 64).unwrap());
    let scan = FilterScan::new(factory, predicate(|r| r.get_long(0) >= 0));

    let mut cursor = scan.execute(&ctx).unwrap();
    let ts = collect_ts(&mut cursor);
    assert_eq!(ts, vec![0, 1, 2, 3, 4], "all rows, ascending ts");
    assert_eq!(
        cursor.frame_sequence().reduce_counter(),
        1,
        "five rows fit one frame"
    );
    cursor.close();
    assert!(cursor.frame_sequence().done_latch().is_released());
}

#[test]
fn test_million_rows_zero_matches_drains_without_deadlock() {
    let bus = MessageBus::new(ExecConfig::try_new(2, 64, 32, 4).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 4, 2).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 4, 7);

    // 1,000,000 rows cut into 10 frames of 100,000
    let factory = Arc::new(MemTableFactory::new(table_of(1_000_000), 100_000).unwrap());
    let scan = FilterScan::new(factory, predicate(|r| r.get_long(0) > 9_999_999));

    let mut cursor = scan.execute(&ctx).unwrap();
    assert!(!cursor.has_next(), "no row matches");
    let fs = Arc::clone(cursor.frame_sequence());
    assert_eq!(fs.reduce_counter(), 10, "every frame was reduced");
    cursor.close();
    assert!(fs.done_latch().is_released());
    assert_eq!(fs.frame_count(), 0, "cleared back to idle");
}

#[test]
fn test_two_concurrent_queries_one_shard_never_misattribute() {
    let bus = MessageBus::new(ExecConfig::try_new(1, 32, 16, 4).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 4, 3).unwrap();
    let ctx = Arc::new(ExecutionContext::with_seed(Arc::clone(&bus), 4, 11));

    // 100 frames of 100 rows each, shared by both queries
    let table = table_of(10_000);
    let factory = Arc::new(MemTableFactory::new(table, 100).unwrap());

    let mut threads = Vec::new();
    for _ in 0..2 {
        let factory = Arc::clone(&factory);
        let ctx = Arc::clone(&ctx);
        threads.push(std::thread::spawn(move || {
            let scan = FilterScan::new(factory, predicate(|r| r.get_long(0) >= 0));
            let mut cursor = scan.execute(&ctx).unwrap();
            let mut rows = Vec::new();
            while cursor.has_next() {
                rows.push(cursor.record().row_id().raw());
            }
            cursor.close();
            rows
        }));
    }

    let expected: Vec<u64> = (0..10_000).collect();
    for t in threads {
        let mut rows = t.join().expect("query thread must not panic");
        assert_eq!(rows.len(), 10_000, "each query sees exactly its own rows");
        rows.sort_unstable();
        assert_eq!(rows, expected, "no frame of the other query leaked in");
    }
}

#[test]
fn test_limit_cancels_rest_of_pipeline() {
    let bus = MessageBus::new(ExecConfig::try_new(1, 64, 32, 4).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 4, 4).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 4, 13);

    // 10 frames of 1,000 rows
    let factory = Arc::new(MemTableFactory::new(table_of(10_000), 1_000).unwrap());
    let scan = FilterScan::new(factory, predicate(|r| r.get_long(0) >= 0)).with_limit(3);

    let mut cursor = scan.execute(&ctx).unwrap();
    let ts = collect_ts(&mut cursor);
    assert_eq!(ts, vec![0, 1, 2], "exactly the first three rows");
    let fs = Arc::clone(cursor.frame_sequence());
    assert!(!fs.is_valid(), "limit exhaustion cancels the sequence");
    cursor.close();
    assert!(fs.done_latch().is_released(), "in-flight work still drained");
}

#[test]
fn test_cancel_before_any_reducer_runs_emits_nothing() {
    // no worker pool: nothing reduces until the foreground steals, so the
    // cancellation below provably precedes every reducer
    let bus = MessageBus::new(ExecConfig::try_new(1, 32, 16, 1).unwrap()).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 0, 17);

    let table = table_of(400);
    let snapshot_refs = Arc::strong_count(&table);
    let factory = Arc::new(MemTableFactory::new(Arc::clone(&table), 50).unwrap());

    let fs = FrameSequence::new(Arc::clone(&bus), Arc::new(FilterReducer));
    let sub = Arc::new(ScSubscriber::unattached());
    let atom: ReduceAtom = Arc::new(FilterAtom::new(predicate(|r| r.get_long(0) >= 0)));
    fs.dispatch(factory.as_ref(), &ctx, Arc::clone(&sub), Some(atom))
        .unwrap();
    assert_eq!(fs.reduce_counter(), 0, "no worker has touched the queue");

    fs.invalidate();

    let mut cursor = ScanCursor::new(Arc::clone(&fs), sub, None);
    assert!(!cursor.has_next(), "an invalid sequence emits no rows");
    assert_eq!(fs.reduce_counter(), 8, "all frames still pass the reducer stage");
    cursor.close();
    assert!(fs.done_latch().is_released());
    assert_eq!(
        Arc::strong_count(&table),
        snapshot_refs + 1,
        "only the factory still holds the snapshot; the reader was released"
    );
}

#[test]
fn test_to_top_after_partial_consumption_replays_everything() {
    let bus = MessageBus::new(ExecConfig::try_new(1, 32, 16, 2).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 2, 5).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 2, 19);

    // 10 frames of 10 rows
    let factory = Arc::new(MemTableFactory::new(table_of(100), 10).unwrap());
    let scan = FilterScan::new(factory, predicate(|r| r.get_long(0) >= 0));

    let mut cursor = scan.execute(&ctx).unwrap();
    let mut first_rows = Vec::new();
    for _ in 0..25 {
        assert!(cursor.has_next(), "plenty of rows before the restart");
        first_rows.push(cursor.record().get_long(1));
    }
    assert_eq!(first_rows, (0..25).collect::<Vec<i64>>());

    cursor.to_top();
    let replay = collect_ts(&mut cursor);
    assert_eq!(
        replay,
        (0..100).collect::<Vec<i64>>(),
        "restart yields all ten frames' rows in order"
    );
    cursor.close();
}
