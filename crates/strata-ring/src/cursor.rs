//! Cursor values and the padded atomic counter they live in.
//!
//! A cursor is a 64-bit monotonically increasing index into a ring. Cursors
//! start at `-1` ("nothing yet"); the first claimed cursor is `0`. Signed
//! 64-bit arithmetic never wraps in practice.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::cache_aligned::CacheAligned;

/// No cursor is available: the ring is full (publishers) or nothing is
/// published (subscribers).
pub const NONE: i64 = -1;

/// A multi-consumer claim collision; the caller should retry.
pub const RETRY: i64 = -2;

/// Initial value of every sequence counter.
pub const START: i64 = -1;

/// A padded atomic cursor.
///
/// One `SeqCounter` per logical sequence position (publisher claim,
/// subscriber claim, subscriber done), each on its own cache line.
#[derive(Debug)]
pub struct SeqCounter(CacheAligned<AtomicI64>);

impl SeqCounter {
    /// A counter at the start position (`-1`).
    #[must_use]
    pub const fn new() -> Self {
        Self(CacheAligned::new(AtomicI64::new(START)))
    }

    #[inline]
    #[must_use]
    pub fn load(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self, value: i64) {
        self.0.store(value, Ordering::Release);
    }

    /// Compare-and-swap `current` to `next`. On failure returns the
    /// observed value.
    #[inline]
    pub fn cas(&self, current: i64, next: i64) -> Result<i64, i64> {
        self.0
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Advance to `value` if it is greater than the stored cursor.
    #[inline]
    pub fn advance_to(&self, value: i64) -> i64 {
        self.0.fetch_max(value, Ordering::AcqRel)
    }
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_before_first_cursor() {
        let c = SeqCounter::new();
        assert_eq!(c.load(), START);
    }

    #[test]
    fn test_cas_reports_observed_value() {
        let c = SeqCounter::new();
        assert_eq!(c.cas(-1, 0), Ok(-1));
        assert_eq!(c.cas(-1, 1), Err(0));
        assert_eq!(c.load(), 0);
    }

    #[test]
    fn test_advance_to_is_monotonic() {
        let c = SeqCounter::new();
        c.advance_to(5);
        c.advance_to(3);
        assert_eq!(c.load(), 5);
    }
}
