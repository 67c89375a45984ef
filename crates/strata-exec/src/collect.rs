//! The collect cursor: the caller-facing row iterator of one query.
//!
//! Drains completed tasks belonging to one frame sequence off the shard's
//! collect fan-out, yields surviving rows in frame order, honors LIMIT,
//! and drives the sequence to quiescence on close, even when the caller
//! abandons the scan early.

use std::sync::Arc;

use strata_error::{Result, StrataError};
use strata_ring::ScSubscriber;
use strata_storage::SymbolTable;
use strata_types::RowId;

use crate::frame_sequence::FrameSequence;
use crate::metrics;
use crate::page_cache::PageFrameRecord;

/// Row-by-row cursor over the surviving rows of one frame sequence.
///
/// Frames arrive in ascending frame index; rows within a frame in the
/// order the reducer wrote them. Tasks of other queries sharing the shard
/// are recognized by identity and released untouched.
pub struct ScanCursor {
    fs: Arc<FrameSequence>,
    sub: Arc<ScSubscriber>,
    record: PageFrameRecord,
    record_b: Option<PageFrameRecord>,
    /// Reduce-ring cursor currently held, `-1` when none. Resetting it on
    /// release is what prevents a double release.
    held_cursor: i64,
    /// Row list borrowed from the held slot, returned on release.
    rows: Vec<u64>,
    frame_row_index: usize,
    frame_row_count: usize,
    frame_index: i64,
    frame_limit: i64,
    /// Remaining row budget from the LIMIT clause; exhaustion cancels the
    /// rest of the pipeline.
    rows_remaining: i64,
    closed: bool,
}

impl ScanCursor {
    /// Wrap a freshly dispatched sequence; `sub` must be the collect
    /// subscriber that was passed to its `dispatch`. Prefetches the first
    /// frame when the sequence published any.
    #[must_use]
    pub fn new(fs: Arc<FrameSequence>, sub: Arc<ScSubscriber>, limit: Option<u64>) -> Self {
        let frame_limit = fs.frame_count() as i64 - 1;
        let record = PageFrameRecord::new(fs.cache(), 0);
        let mut cursor = Self {
            fs,
            sub,
            record,
            record_b: None,
            held_cursor: -1,
            rows: Vec::new(),
            frame_row_index: 0,
            frame_row_count: 0,
            frame_index: -1,
            frame_limit,
            rows_remaining: limit.map_or(i64::MAX, |l| i64::try_from(l).unwrap_or(i64::MAX)),
            closed: false,
        };
        // with zero frames the collect sequence was never attached and
        // must not be polled
        if cursor.frame_limit >= 0 {
            cursor.fetch_next_frame();
        }
        cursor
    }

    /// Advance to the next surviving row. After `true`, [`record`]
    /// (&self) is positioned on the row.
    ///
    /// [`record`]: Self::record
    pub fn has_next(&mut self) -> bool {
        loop {
            // rows still pending in the current frame
            if self.frame_row_index < self.frame_row_count {
                let row = self.rows[self.frame_row_index];
                self.frame_row_index += 1;
                self.record.set_row(row);
                return self.check_limit();
            }

            // the identity check happened when the cursor was claimed
            self.release_held();

            if self.frame_index < self.frame_limit {
                self.fetch_next_frame();
                if self.frame_row_count > 0 {
                    continue;
                }
            }
            return false;
        }
    }

    /// The record positioned by the last successful [`has_next`].
    ///
    /// [`has_next`]: Self::has_next
    #[inline]
    #[must_use]
    pub fn record(&self) -> &PageFrameRecord {
        &self.record
    }

    /// A second, independently positionable record over the same frames.
    pub fn record_b(&mut self) -> &mut PageFrameRecord {
        if self.record_b.is_none() {
            self.record_b = Some(self.record.clone());
        }
        self.record_b.as_mut().expect("record_b was just installed")
    }

    /// Re-bind a record to an arbitrary row by its packed id.
    ///
    /// # Errors
    ///
    /// Fails when the row's partition is not part of this execution.
    pub fn record_at(&self, record: &mut PageFrameRecord, row_id: RowId) -> Result<()> {
        let cache = self.fs.cache();
        let partition = row_id.to_partition_index() as usize;
        let frame = cache.first_frame_of_partition(partition).ok_or(
            StrataError::PartitionOutOfBounds {
                partition,
                count: cache.partition_count(),
            },
        )?;
        record.set_frame(frame);
        record.set_row(row_id.to_local_row());
        Ok(())
    }

    /// Restart the scan from the first row, reusing the sequence identity.
    pub fn to_top(&mut self) {
        if self.frame_index == 0 && self.frame_row_index == 0 {
            return;
        }
        self.release_held();
        self.fs.reducer().to_top();
        self.fs.to_top();
        self.frame_index = -1;
        self.frame_row_index = 0;
        self.frame_row_count = 0;
        if self.frame_limit >= 0 {
            self.fetch_next_frame();
        }
    }

    /// Total row count is unknown for a filtered scan.
    #[inline]
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        None
    }

    /// Symbol dictionary of a column, when it has one.
    #[must_use]
    pub fn symbol_table(&self, column: usize) -> Option<Arc<SymbolTable>> {
        self.fs.cache().symbol_table(column)
    }

    /// Cancel the query: the pipeline fast-drains and `has_next` stops
    /// yielding. In-flight reducers still complete.
    pub fn cancel(&self) {
        self.fs.invalidate();
    }

    /// The sequence this cursor drains (identity, counters, validity).
    #[inline]
    #[must_use]
    pub fn frame_sequence(&self) -> &Arc<FrameSequence> {
        &self.fs
    }

    /// Release held state, drive the sequence to quiescence and reset it.
    /// Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::debug!(
            shard = self.fs.shard(),
            id = self.fs.id(),
            frame_index = self.frame_index,
            frame_count = self.frame_limit + 1,
            "collect.close"
        );
        self.release_held();
        if self.frame_limit >= 0 {
            self.fs.await_done();
        }
        self.fs.clear();
    }

    /// Enforce the LIMIT budget on an already-positioned row.
    fn check_limit(&mut self) -> bool {
        self.rows_remaining -= 1;
        if self.rows_remaining < 0 {
            self.fs.invalidate();
            return false;
        }
        true
    }

    /// Claim the next task of this sequence off the collect fan-out.
    ///
    /// Foreign tasks and own empty/invalidated tasks are released in
    /// place; an empty stage triggers one unit of work-stealing. The loop
    /// ends holding a frame with rows, or with `frame_index` at the limit
    /// after a drain.
    fn fetch_next_frame(&mut self) {
        debug_assert!(self.held_cursor < 0, "a held slot must be released first");
        let bus = Arc::clone(self.fs.bus());
        let fs = Arc::clone(&self.fs);
        let shard_index = fs.shard();
        loop {
            let c = self.sub.next();
            if c >= 0 {
                let claimed_frame = {
                    let mut slot = bus.shard(shard_index).reduce_ring.slot(c).lock();
                    if slot.belongs_to(&fs) {
                        self.frame_index = slot.frame_index as i64;
                        if !slot.rows.is_empty() && fs.is_valid() {
                            self.rows = std::mem::take(&mut slot.rows);
                            self.frame_row_count = self.rows.len();
                            self.frame_row_index = 0;
                            self.record.set_frame(slot.frame_index);
                            true
                        } else {
                            // own frame with nothing to emit
                            slot.collected = true;
                            false
                        }
                    } else {
                        // not our task, nothing to collect
                        false
                    }
                };
                if claimed_frame {
                    self.held_cursor = c;
                    metrics::record_frame_collected();
                    tracing::debug!(
                        shard = shard_index,
                        id = fs.id(),
                        frame_index = self.frame_index,
                        frame_count = fs.frame_count(),
                        valid = fs.is_valid(),
                        cursor = c,
                        "collect.frame"
                    );
                    return;
                }
                self.sub.done(c);
            } else {
                fs.steal_work();
            }
            if self.frame_index >= self.frame_limit {
                return;
            }
        }
    }

    /// Return the row buffer to the held slot, mark it collected and
    /// release the cursor. Clearing `held_cursor` is mandatory; a replay
    /// would double-release the slot.
    fn release_held(&mut self) {
        if self.held_cursor < 0 {
            return;
        }
        let bus = Arc::clone(self.fs.bus());
        {
            let mut slot = bus
                .shard(self.fs.shard())
                .reduce_ring
                .slot(self.held_cursor)
                .lock();
            slot.rows = std::mem::take(&mut self.rows);
            slot.collected = true;
        }
        self.sub.done(self.held_cursor);
        self.held_cursor = -1;
        self.frame_row_index = 0;
        self.frame_row_count = 0;
    }
}

impl Drop for ScanCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCursor")
            .field("frame_index", &self.frame_index)
            .field("frame_limit", &self.frame_limit)
            .field("held_cursor", &self.held_cursor)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
