//! Ring-level counters (lock-free, Relaxed ordering).

use std::sync::atomic::{AtomicU64, Ordering};

static STRATA_RING_PUBLISHER_FULL_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_RING_CLAIM_COLLISIONS_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_RING_FANOUT_ATTACH_TOTAL: AtomicU64 = AtomicU64::new(0);
static STRATA_RING_FANOUT_DETACH_TOTAL: AtomicU64 = AtomicU64::new(0);

#[inline]
pub(crate) fn record_publisher_full() {
    STRATA_RING_PUBLISHER_FULL_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_claim_collision() {
    STRATA_RING_CLAIM_COLLISIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_fanout_attach() {
    STRATA_RING_FANOUT_ATTACH_TOTAL.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn record_fanout_detach() {
    STRATA_RING_FANOUT_DETACH_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of ring metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RingMetrics {
    pub strata_ring_publisher_full_total: u64,
    pub strata_ring_claim_collisions_total: u64,
    pub strata_ring_fanout_attach_total: u64,
    pub strata_ring_fanout_detach_total: u64,
}

/// Read current ring metrics.
#[must_use]
pub fn ring_metrics() -> RingMetrics {
    RingMetrics {
        strata_ring_publisher_full_total: STRATA_RING_PUBLISHER_FULL_TOTAL.load(Ordering::Relaxed),
        strata_ring_claim_collisions_total: STRATA_RING_CLAIM_COLLISIONS_TOTAL
            .load(Ordering::Relaxed),
        strata_ring_fanout_attach_total: STRATA_RING_FANOUT_ATTACH_TOTAL.load(Ordering::Relaxed),
        strata_ring_fanout_detach_total: STRATA_RING_FANOUT_DETACH_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset metrics (for tests).
pub fn reset_ring_metrics() {
    STRATA_RING_PUBLISHER_FULL_TOTAL.store(0, Ordering::Relaxed);
    STRATA_RING_CLAIM_COLLISIONS_TOTAL.store(0, Ordering::Relaxed);
    STRATA_RING_FANOUT_ATTACH_TOTAL.store(0, Ordering::Relaxed);
    STRATA_RING_FANOUT_DETACH_TOTAL.store(0, Ordering::Relaxed);
}
