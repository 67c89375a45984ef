//! Primary error type for StrataDB pipeline operations.
//!
//! Structured variants for the cases callers can act on; everything that
//! happens after a query is dispatched is reported through the frame
//! sequence's validity flag instead of an error value, so this enum covers
//! the setup path (configuration, reader open, cursor construction) and
//! reducer-side data faults.

use thiserror::Error;

/// Errors surfaced by the StrataDB execution pipeline.
#[derive(Error, Debug)]
pub enum StrataError {
    // === Configuration ===
    /// A configuration value failed validation.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: &'static str },

    /// A queue capacity was not a power of two.
    #[error("{what} must be a power of two, got {value}")]
    CapacityNotPowerOfTwo { what: &'static str, value: usize },

    // === Reader / storage ===
    /// A column index was out of bounds for the table.
    #[error("column index {column} out of bounds for table with {count} columns")]
    ColumnOutOfBounds { column: usize, count: usize },

    /// A partition index was out of bounds for the table.
    #[error("partition index {partition} out of bounds for table with {count} partitions")]
    PartitionOutOfBounds { partition: usize, count: usize },

    /// The table reader could not be opened.
    #[error("cannot open table reader: {detail}")]
    ReaderOpen { detail: String },

    /// An operation required a reader that has already been released.
    #[error("table reader has been released")]
    ReaderClosed,

    /// A partition held more rows than a row id can address.
    #[error("partition {partition} exceeds addressable row count")]
    PartitionTooLarge { partition: usize },

    // === Reduce ===
    /// A reducer reported a fatal data error for one frame.
    #[error("reducer failed on frame {frame_index}: {detail}")]
    ReducerFailed { frame_index: usize, detail: String },

    /// A row referenced by a reduce result does not exist in its frame.
    #[error("row {row} out of bounds for frame of {row_count} rows")]
    RowOutOfBounds { row: u64, row_count: u64 },

    // === Cursor contract ===
    /// The frame sequence was dispatched while a previous round is live.
    #[error("frame sequence is still executing a previous dispatch")]
    SequenceBusy,

    // === Worker pool ===
    /// An OS worker thread could not be spawned.
    #[error("cannot spawn worker thread: {detail}")]
    WorkerSpawn { detail: String },
}

/// Result alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, StrataError>;
