//! Pipeline counters (lock-free, Relaxed ordering).

use std::sync::atomic::{AtomicU64, Ordering};

static STRATA_EXEC_REDUCE_TASKS_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_EXEC_REDUCER_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_EXEC_DISPATCH_STALLS_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_EXEC_STEALS_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_EXEC_FRAMES_COLLECTED_TOTAL: AtomicU64 = AtomicU64::new(0);

#[inline]
pub(crate) fn record_reduce_task() {
    STRATA_EXEC_REDUCE_TASKS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_reducer_failure() {
    STRATA_EXEC_REDUCER_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_dispatch_stall() {
    STRATA_EXEC_DISPATCH_STALLS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_steal() {
    STRATA_EXEC_STEALS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_frame_collected() {
    STRATA_EXEC_FRAMES_COLLECTED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of pipeline metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecMetrics {
    pub strata_exec_reduce_tasks_total: u64,
    pub strata_exec_reducer_failures_total: u64,
    pub strata_exec_dispatch_stalls_total: u64,
    pub strata_exec_steals_total: u64,
    pub strata_exec_frames_collected_total: u64,
}

/// Read current pipeline metrics.
#[must_use]
pub fn exec_metrics() -> ExecMetrics {
    ExecMetrics {
        strata_exec_reduce_tasks_total: STRATA_EXEC_REDUCE_TASKS_TOTAL.load(Ordering::Relaxed),
        strata_exec_reducer_failures_total: STRATA_EXEC_REDUCER_FAILURES_TOTAL
            .load(Ordering::Relaxed),
        strata_exec_dispatch_stalls_total: STRATA_EXEC_DISPATCH_STALLS_TOTAL
            .load(Ordering::Relaxed),
        strata_exec_steals_total: STRATA_EXEC_STEALS_TOTAL.load(Ordering::Relaxed),
        strata_exec_frames_collected_total: STRATA_EXEC_FRAMES_COLLECTED_TOTAL
            .load(Ordering::Relaxed),
    }
}

/// Reset metrics (for tests).
pub fn reset_exec_metrics() {
    STRATA_EXEC_REDUCE_TASKS_TOTAL.store(0, Ordering::Relaxed);
    STRATA_EXEC_REDUCER_FAILURES_TOTAL.store(0, Ordering::Relaxed);
    STRATA_EXEC_DISPATCH_STALLS_TOTAL.store(0, Ordering::Relaxed);
    STRATA_EXEC_STEALS_TOTAL.store(0, Ordering::Relaxed);
    STRATA_EXEC_FRAMES_COLLECTED_TOTAL.store(0, Ordering::Relaxed);
}
