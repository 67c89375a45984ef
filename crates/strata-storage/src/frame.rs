//! Page frames and the reader interfaces that produce them.

use std::sync::Arc;

use strata_error::Result;

/// Storage class of a column. All storage cells are 64-bit; the kind
/// decides interpretation (symbol cells are dictionary keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Plain 64-bit integer.
    Long,
    /// Epoch-micros timestamp; tables are ordered by their designated
    /// timestamp column.
    Timestamp,
    /// Dictionary-encoded string; cell values index a [`SymbolTable`].
    Symbol,
}

/// One column's metadata.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Table metadata: column names/kinds and the designated timestamp column.
#[derive(Debug, Clone)]
pub struct TableMeta {
    columns: Vec<ColumnMeta>,
    timestamp_index: Option<usize>,
}

impl TableMeta {
    /// Build metadata; the timestamp index, when present, must point at a
    /// `Timestamp` column.
    #[must_use]
    pub fn new(columns: Vec<ColumnMeta>, timestamp_index: Option<usize>) -> Self {
        if let Some(i) = timestamp_index {
            debug_assert!(matches!(columns[i].kind, ColumnKind::Timestamp));
        }
        Self {
            columns,
            timestamp_index,
        }
    }

    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    #[must_use]
    pub fn column(&self, index: usize) -> &ColumnMeta {
        &self.columns[index]
    }

    #[inline]
    #[must_use]
    pub fn timestamp_index(&self) -> Option<usize> {
        self.timestamp_index
    }

    /// Index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Dictionary for one symbol column: key `k` maps to `values[k]`.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    values: Vec<Arc<str>>,
}

impl SymbolTable {
    #[must_use]
    pub fn new(values: Vec<Arc<str>>) -> Self {
        Self { values }
    }

    /// Resolve a dictionary key. Negative keys encode NULL.
    #[must_use]
    pub fn value_of(&self, key: i64) -> Option<&str> {
        if key < 0 {
            return None;
        }
        self.values.get(key as usize).map(|v| &**v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A contiguous, page-aligned row range of one partition, presented with
/// its column buffers.
///
/// Column buffers span the whole partition; the frame addresses rows
/// `[row_lo, row_hi)` within them. Buffers are shared (`Arc`), so a frame
/// is cheap to hand across threads and keeps the underlying snapshot alive.
#[derive(Debug, Clone)]
pub struct PageFrame {
    partition_index: usize,
    row_lo: u64,
    row_hi: u64,
    columns: Vec<Arc<Vec<i64>>>,
}

impl PageFrame {
    /// # Panics
    ///
    /// Debug-asserts `row_lo <= row_hi` and in-bounds column buffers.
    #[must_use]
    pub fn new(partition_index: usize, row_lo: u64, row_hi: u64, columns: Vec<Arc<Vec<i64>>>) -> Self {
        debug_assert!(row_lo <= row_hi);
        debug_assert!(columns.iter().all(|c| c.len() as u64 >= row_hi));
        Self {
            partition_index,
            row_lo,
            row_hi,
            columns,
        }
    }

    #[inline]
    #[must_use]
    pub fn partition_index(&self) -> usize {
        self.partition_index
    }

    /// First partition-local row of the frame (inclusive).
    #[inline]
    #[must_use]
    pub fn row_lo(&self) -> u64 {
        self.row_lo
    }

    /// End partition-local row of the frame (exclusive).
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

    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// The whole-partition buffer backing column `index`.
    #[inline]
    #[must_use]
    pub fn column_data(&self, index: usize) -> &Arc<Vec<i64>> {
        &self.columns[index]
    }
}

/// Lazy sequence of page frames over one table snapshot, in reader order.
///
/// Dropping the cursor releases the snapshot.
pub trait PageFrameCursor: Send {
    /// The next frame, or `None` at the end of the table.
    fn next_frame(&mut self) -> Option<PageFrame>;

    /// Rewind to the first frame.
    fn to_top(&mut self);

    /// Symbol dictionary for a column, when it is a symbol column. Shared
    /// so the dictionary can outlive the cursor's snapshot hold.
    fn symbol_table(&self, column: usize) -> Option<Arc<SymbolTable>>;
}

/// Produces page-frame cursors over a snapshot of a table.
pub trait RecordCursorFactory: Send + Sync {
    fn metadata(&self) -> &TableMeta;

    /// Open a page-frame cursor. The cursor owns a snapshot of the table
    /// until it is dropped.
    ///
    /// # Errors
    ///
    /// Fails when the table cannot be read (the only pre-dispatch error
    /// path of a scan).
    fn page_frame_cursor(&self) -> Result<Box<dyn PageFrameCursor>>;
}
