//! Many queries interleaving on the shared queues: identity isolation,
//! shard independence, cancellation under load, reducer failure handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_error::StrataError;
use strata_exec::{
    ExecConfig, ExecutionContext, FilterScan, MessageBus, PageFrameRecord, RowPredicate,
    ScanCursor, WorkerPool, predicate,
};
use strata_storage::{ColumnKind, ColumnMeta, MemTable, MemTableFactory};

fn table_of(rows: i64) -> Arc<MemTable> {
    MemTable::builder(vec![ColumnMeta::new("x", ColumnKind::Long)])
        .partition(vec![(0..rows).collect()])
        .unwrap()
        .build()
}

fn collect_x(cursor: &mut ScanCursor) -> Vec<i64> {
    let mut out = Vec::new();
    while cursor.has_next() {
        out.push(cursor.record().get_long(0));
    }
    out
}

#[test]
fn test_many_queries_share_queues_without_crosstalk() {
    const QUERIES: i64 = 4;
    const ROWS: i64 = 4_000;

    let bus = MessageBus::new(ExecConfig::try_new(2, 16, 8, 3).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 3, 51).unwrap();
    let ctx = Arc::new(ExecutionContext::with_seed(Arc::clone(&bus), 3, 53));
    let factory = Arc::new(MemTableFactory::new(table_of(ROWS), 100).unwrap());

    let mut threads = Vec::new();
    for residue in 0..QUERIES {
        let factory = Arc::clone(&factory);
        let ctx = Arc::clone(&ctx);
        threads.push(std::thread::spawn(move || {
            let scan = FilterScan::new(factory, predicate(move |r| r.get_long(0) % QUERIES == residue));
            let mut cursor = scan.execute(&ctx).unwrap();
            let rows = collect_x(&mut cursor);
            cursor.close();
            (residue, rows)
        }));
    }

    for t in threads {
        let (residue, rows) = t.join().expect("query thread must not panic");
        let expected: Vec<i64> = (0..ROWS).filter(|x| x % QUERIES == residue).collect();
        assert_eq!(rows, expected, "query {residue} got exactly its own rows");
    }
}

#[test]
fn test_concurrent_result_matches_solo_result() {
    let solo = {
        let bus = MessageBus::new(ExecConfig::try_new(2, 16, 8, 2).unwrap()).unwrap();
        let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 2, 57).unwrap();
        let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 2, 59);
        let factory = Arc::new(MemTableFactory::new(table_of(2_000), 64).unwrap());
        let mut cursor = FilterScan::new(factory, predicate(|r| r.get_long(0) % 7 == 0))
            .execute(&ctx)
            .unwrap();
        let rows = collect_x(&mut cursor);
        cursor.close();
        rows
    };

    let bus = MessageBus::new(ExecConfig::try_new(2, 16, 8, 2).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 2, 61).unwrap();
    let ctx = Arc::new(ExecutionContext::with_seed(Arc::clone(&bus), 2, 63));
    let factory = Arc::new(MemTableFactory::new(table_of(2_000), 64).unwrap());

    let mut threads = Vec::new();
    for _ in 0..3 {
        let factory = Arc::clone(&factory);
        let ctx = Arc::clone(&ctx);
        threads.push(std::thread::spawn(move || {
            let mut cursor = FilterScan::new(factory, predicate(|r| r.get_long(0) % 7 == 0))
                .execute(&ctx)
                .unwrap();
            let rows = collect_x(&mut cursor);
            cursor.close();
            rows
        }));
    }
    for t in threads {
        assert_eq!(
            t.join().expect("query thread must not panic"),
            solo,
            "sharing the bus does not change any query's result"
        );
    }
}

#[test]
fn test_cancel_mid_consumption_terminates_cleanly() {
    let bus = MessageBus::new(ExecConfig::try_new(1, 16, 8, 2).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 2, 67).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 2, 71);

    let factory = Arc::new(MemTableFactory::new(table_of(5_000), 50).unwrap());
    let scan = FilterScan::new(factory, predicate(|r| r.get_long(0) >= 0));

    let mut cursor = scan.execute(&ctx).unwrap();
    let mut emitted = 0_usize;
    while cursor.has_next() {
        emitted += 1;
        if emitted == 120 {
            cursor.cancel();
        }
    }
    // the current frame may finish emitting after cancellation; nothing
    // beyond it may
    assert!(emitted >= 120);
    assert!(emitted <= 120 + 50, "at most the held frame drains after cancel");
    let fs = Arc::clone(cursor.frame_sequence());
    assert!(!fs.is_valid());
    cursor.close();
    assert!(fs.done_latch().is_released());
}

#[test]
fn test_reducer_failure_invalidates_and_never_panics_the_caller() {
    struct FailAfter {
        threshold: i64,
        tripped: AtomicBool,
    }
    impl RowPredicate for FailAfter {
        fn test(&self, record: &PageFrameRecord) -> strata_error::Result<bool> {
            if record.get_long(0) >= self.threshold {
                self.tripped.store(true, Ordering::Release);
                return Err(StrataError::RowOutOfBounds {
                    row: record.row(),
                    row_count: 0,
                });
            }
            Ok(true)
        }
    }

    let bus = MessageBus::new(ExecConfig::try_new(1, 16, 8, 2).unwrap()).unwrap();
    let _pool = WorkerPool::start_with_seed(Arc::clone(&bus), 2, 73).unwrap();
    let ctx = ExecutionContext::with_seed(Arc::clone(&bus), 2, 79);

    let factory = Arc::new(MemTableFactory::new(table_of(1_000), 100).unwrap());
    let pred = Arc::new(FailAfter {
        threshold: 250,
        tripped: AtomicBool::new(false),
    });
    let shared: Arc<dyn RowPredicate> = pred.clone();
    let scan = FilterScan::new(factory, shared);

    let mut cursor = scan.execute(&ctx).unwrap();
    let rows = collect_x(&mut cursor);
    // frames before the poisoned one may emit; the failure point and
    // everything after it may not
    assert!(rows.len() <= 250, "no row at or past the failure threshold");
    assert!(rows.iter().all(|&x| x < 250));
    let fs = Arc::clone(cursor.frame_sequence());
    assert!(pred.tripped.load(Ordering::Acquire), "the reducer did fail");
    assert!(!fs.is_valid(), "failure surfaced as invalidation");
    cursor.close();
    assert!(fs.done_latch().is_released(), "failed query still drains");
}
