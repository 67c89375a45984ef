//! Per-query page-address cache and the record bound to it.
//!
//! The dispatcher walks the reader exactly once, capturing every frame's
//! partition, row bounds and column buffers here before any reduce task is
//! published. Reducers and collectors then address columnar data through
//! the cache without re-entering the reader. Written once, read many; the
//! installed cache is immutable until `clear()` swaps in an empty one.

use std::sync::Arc;

use strata_storage::{PageFrame, SymbolTable};
use strata_types::RowId;

/// One frame's captured addresses.
#[derive(Debug, Clone)]
pub struct FrameAddress {
    partition_index: usize,
    row_lo: u64,
    row_hi: u64,
    columns: Vec<Arc<Vec<i64>>>,
}

impl FrameAddress {
    #[inline]
    #[must_use]
    pub fn partition_index(&self) -> usize {
        self.partition_index
    }

    #[inline]
    #[must_use]
    pub fn row_lo(&self) -> u64 {
        self.row_lo
    }

    #[inline]
    #[must_use]
    pub fn row_hi(&self) -> u64 {
        self.row_hi
    }

    #[inline]
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.row_hi - self.row_lo
    }
}

/// Frame address table of one query execution.
#[derive(Debug, Default)]
pub struct PageAddressCache {
    frames: Vec<FrameAddress>,
    symbols: Vec<Option<Arc<SymbolTable>>>,
}

impl PageAddressCache {
    /// An empty cache (the idle state of a frame sequence).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building with the given per-column symbol dictionaries.
    #[must_use]
    pub fn with_symbols(symbols: Vec<Option<Arc<SymbolTable>>>) -> Self {
        Self {
            frames: Vec::new(),
            symbols,
        }
    }

    /// Capture one frame. Called only during the dispatch walk, in frame
    /// order.
    pub fn add(&mut self, frame: &PageFrame) {
        self.frames.push(FrameAddress {
            partition_index: frame.partition_index(),
            row_lo: frame.row_lo(),
            row_hi: frame.row_hi(),
            columns: (0..frame.column_count())
                .map(|c| Arc::clone(frame.column_data(c)))
                .collect(),
        });
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    #[must_use]
    pub fn frame(&self, index: usize) -> &FrameAddress {
        &self.frames[index]
    }

    #[inline]
    #[must_use]
    pub fn frame_row_count(&self, index: usize) -> u64 {
        self.frames[index].row_count()
    }

    /// Symbol dictionary of a column, when it has one.
    #[must_use]
    pub fn symbol_table(&self, column: usize) -> Option<Arc<SymbolTable>> {
        self.symbols.get(column)?.clone()
    }

    /// First cached frame of a partition. Column buffers span whole
    /// partitions, so any frame of the partition can address any of its
    /// rows; `record_at` uses this to re-bind a record from a row id.
    #[must_use]
    pub fn first_frame_of_partition(&self, partition_index: usize) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.partition_index == partition_index)
    }

    /// Number of partitions covered by the cached frames.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.frames
            .iter()
            .map(|f| f.partition_index + 1)
            .max()
            .unwrap_or(0)
    }
}

/// A record positioned on one row of one cached frame.
///
/// Each worker owns its record (and the foreground owns one more); binding
/// is two index stores, so the reduce path allocates nothing per frame.
#[derive(Debug, Clone)]
pub struct PageFrameRecord {
    cache: Arc<PageAddressCache>,
    frame_index: usize,
    row: u64,
}

impl PageFrameRecord {
    /// A record over `cache`, positioned at the first row of `frame_index`
    /// (row 0 for an empty cache).
    #[must_use]
    pub fn new(cache: Arc<PageAddressCache>, frame_index: usize) -> Self {
        let row = if frame_index < cache.frame_count() {
            cache.frame(frame_index).row_lo
        } else {
            0
        };
        Self {
            cache,
            frame_index,
            row,
        }
    }

    #[inline]
    pub fn set_frame(&mut self, frame_index: usize) {
        self.frame_index = frame_index;
    }

    /// Position on a partition-local row.
    #[inline]
    pub fn set_row(&mut self, row: u64) {
        self.row = row;
    }

    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Partition-local row this record is positioned on.
    #[inline]
    #[must_use]
    pub fn row(&self) -> u64 {
        self.row
    }

    /// Partition-local row bounds `[lo, hi)` of the bound frame.
    #[inline]
    #[must_use]
    pub fn frame_row_bounds(&self) -> (u64, u64) {
        let frame = self.cache.frame(self.frame_index);
        (frame.row_lo, frame.row_hi)
    }

    /// Packed row id of the current position.
    #[must_use]
    pub fn row_id(&self) -> RowId {
        let partition = self.cache.frame(self.frame_index).partition_index as u64;
        RowId::new(partition, self.row).expect("cached frames stay within row-id bounds")
    }

    /// Read a 64-bit column cell at the current position.
    #[inline]
    #[must_use]
    pub fn get_long(&self, column: usize) -> i64 {
        self.cache.frame(self.frame_index).columns[column][self.row as usize]
    }

    /// Resolve a symbol column at the current position.
    #[must_use]
    pub fn get_symbol(&self, column: usize) -> Option<Arc<str>> {
        let key = self.get_long(column);
        let table = self.cache.symbol_table(column)?;
        if key < 0 {
            return None;
        }
        table.value_of(key).map(Arc::from)
    }
}
