//! The slot storage of a ring queue and its publication cells.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::cache_aligned::CacheAligned;
use crate::cursor;
use crate::seq::Gate;

/// Fixed-capacity circular buffer of task slots addressed by
/// `cursor & mask`.
///
/// Slot payloads are deliberately shared across producer/consumer handoffs:
/// a reduce task's row list lives in its slot forever and is only cleared,
/// never reallocated, between reuses. Each slot carries its own mutex; the
/// sequence protocol guarantees exactly one owner per cursor between
/// `next()` and `done()`, so the lock is uncontended and exists to keep
/// slot mutation free of `unsafe`.
pub struct RingBuffer<T> {
    slots: Box<[Mutex<T>]>,
    mask: i64,
}

impl<T> RingBuffer<T> {
    /// Create a ring of `capacity` slots, each initialized by `init`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a power of two. Capacities are
    /// validated at configuration time; this is the last line of defense.
    #[must_use]
    pub fn new_with(capacity: usize, mut init: impl FnMut() -> T) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two, got {capacity}"
        );
        let slots = (0..capacity).map(|_| Mutex::new(init())).collect();
        Self {
            slots,
            mask: capacity as i64 - 1,
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The slot a cursor addresses.
    #[inline]
    #[must_use]
    pub fn slot(&self, cursor: i64) -> &Mutex<T> {
        debug_assert!(cursor >= 0, "cursor {cursor} is not a claimed cursor");
        &self.slots[(cursor & self.mask) as usize]
    }
}

impl<T: Default> RingBuffer<T> {
    /// Create a ring of default-initialized slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::new_with(capacity, T::default)
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

/// Per-slot publication cells for a ring's publisher side.
///
/// Cell `c & mask` holds the cursor value most recently published into that
/// slot (`-1` when never published). A cursor is visible to the first
/// subscriber stage iff its cell equals it; the equality check survives
/// wrap-around because a recycled slot stores `c + capacity`, never `c`,
/// on its next publication. Multi-producer publication is out of order, so
/// the contiguous frontier is recovered lazily in [`Availability::position`].
pub struct Availability {
    cells: Box<[CacheAligned<AtomicI64>]>,
    frontier: CacheAligned<AtomicI64>,
    mask: i64,
}

impl Availability {
    /// Cells for a ring of `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two, got {capacity}"
        );
        let cells = (0..capacity)
            .map(|_| CacheAligned::new(AtomicI64::new(cursor::START)))
            .collect();
        Self {
            cells,
            frontier: CacheAligned::new(AtomicI64::new(cursor::START)),
            mask: capacity as i64 - 1,
        }
    }

    /// Mark `cursor` published. Called by the publisher's `done`.
    #[inline]
    pub fn publish(&self, cursor: i64) {
        self.cells[(cursor & self.mask) as usize].store(cursor, Ordering::Release);
    }

    /// Whether `cursor` has been published.
    #[inline]
    #[must_use]
    pub fn is_published(&self, cursor: i64) -> bool {
        self.cells[(cursor & self.mask) as usize].load(Ordering::Acquire) == cursor
    }
}

impl Gate for Availability {
    #[inline]
    fn can_pass(&self, cursor: i64) -> bool {
        self.is_published(cursor)
    }

    /// Highest contiguously published cursor.
    ///
    /// Walks forward from the cached frontier; the walk is bounded by the
    /// ring capacity because unpublished cells stop it.
    fn position(&self) -> i64 {
        let mut p = self.frontier.load(Ordering::Acquire);
        while self.is_published(p + 1) {
            p += 1;
        }
        self.frontier.fetch_max(p, Ordering::AcqRel);
        p
    }
}

impl std::fmt::Debug for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Availability")
            .field("capacity", &self.cells.len())
            .field("frontier", &self.frontier.load(Ordering::Relaxed))
            .finish()
    }
}
