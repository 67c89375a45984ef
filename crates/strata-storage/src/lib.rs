//! Page-frame readers for the StrataDB execution pipeline.
//!
//! The pipeline consumes tables exclusively through the interfaces here: a
//! [`RecordCursorFactory`] opens a [`PageFrameCursor`] over a snapshot of a
//! table, and the cursor yields [`PageFrame`]s: contiguous, page-aligned
//! row ranges of one partition together with their column buffers.
//!
//! [`MemTable`] is the reference implementation: an immutable, partitioned,
//! columnar in-memory table whose cursor cuts each partition into
//! fixed-size frames.

pub mod frame;
pub mod mem_table;

pub use frame::{
    ColumnKind, ColumnMeta, PageFrame, PageFrameCursor, RecordCursorFactory, SymbolTable,
    TableMeta,
};
pub use mem_table::{MemTable, MemTableBuilder, MemTableFactory};
