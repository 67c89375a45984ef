//! Immutable in-memory partitioned columnar table.
//!
//! The reference [`RecordCursorFactory`] implementation. A table is a list
//! of partitions, each a set of equally sized `Arc<Vec<i64>>` column
//! buffers; the factory's cursor cuts every partition into fixed-size
//! frames, covering each partition's full row range without gaps.

use std::sync::Arc;

use strata_error::{Result, StrataError};
use strata_types::LOCAL_ROW_MASK;

use crate::frame::{
    ColumnKind, ColumnMeta, PageFrame, PageFrameCursor, RecordCursorFactory, SymbolTable,
    TableMeta,
};

/// One partition's column buffers.
#[derive(Debug, Clone)]
struct MemPartition {
    columns: Vec<Arc<Vec<i64>>>,
    row_count: u64,
}

/// Immutable partitioned columnar table. Sharing the `Arc<MemTable>` is the
/// snapshot contract: a cursor holds the table alive until dropped and
/// never observes mutation.
#[derive(Debug)]
pub struct MemTable {
    meta: TableMeta,
    partitions: Vec<MemPartition>,
    symbols: Vec<Option<Arc<SymbolTable>>>,
}

impl MemTable {
    /// Start building a table with the given columns.
    #[must_use]
    pub fn builder(columns: Vec<ColumnMeta>) -> MemTableBuilder {
        MemTableBuilder::new(columns)
    }

    #[inline]
    #[must_use]
    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    #[inline]
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Rows in one partition.
    ///
    /// # Errors
    ///
    /// Fails when `partition` is out of bounds.
    pub fn partition_row_count(&self, partition: usize) -> Result<u64> {
        self.partitions
            .get(partition)
            .map(|p| p.row_count)
            .ok_or(StrataError::PartitionOutOfBounds {
                partition,
                count: self.partitions.len(),
            })
    }

    /// Total rows across partitions.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.partitions.iter().map(|p| p.row_count).sum()
    }
}

/// Builder for [`MemTable`].
#[derive(Debug)]
pub struct MemTableBuilder {
    columns: Vec<ColumnMeta>,
    timestamp_index: Option<usize>,
    partitions: Vec<MemPartition>,
    symbols: Vec<Option<Arc<SymbolTable>>>,
}

impl MemTableBuilder {
    #[must_use]
    fn new(columns: Vec<ColumnMeta>) -> Self {
        let timestamp_index = columns
            .iter()
            .position(|c| matches!(c.kind, ColumnKind::Timestamp));
        let symbols = vec![None; columns.len()];
        Self {
            columns,
            timestamp_index,
            partitions: Vec::new(),
            symbols,
        }
    }

    /// Install the dictionary for a symbol column.
    ///
    /// # Errors
    ///
    /// Fails when `column` is out of bounds.
    pub fn symbol_table(mut self, column: usize, table: SymbolTable) -> Result<Self> {
        if column >= self.columns.len() {
            return Err(StrataError::ColumnOutOfBounds {
                column,
                count: self.columns.len(),
            });
        }
        self.symbols[column] = Some(Arc::new(table));
        Ok(self)
    }

    /// Append one partition from per-column value vectors.
    ///
    /// # Errors
    ///
    /// Fails when the column count is wrong, the columns differ in length,
    /// or the partition exceeds the addressable row count.
    pub fn partition(mut self, columns: Vec<Vec<i64>>) -> Result<Self> {
        if columns.len() != self.columns.len() {
            return Err(StrataError::ColumnOutOfBounds {
                column: columns.len(),
                count: self.columns.len(),
            });
        }
        let row_count = columns.first().map_or(0, Vec::len) as u64;
        if columns.iter().any(|c| c.len() as u64 != row_count) {
            return Err(StrataError::ReaderOpen {
                detail: "partition columns differ in length".to_owned(),
            });
        }
        if row_count > LOCAL_ROW_MASK {
            return Err(StrataError::PartitionTooLarge {
                partition: self.partitions.len(),
            });
        }
        self.partitions.push(MemPartition {
            columns: columns.into_iter().map(Arc::new).collect(),
            row_count,
        });
        Ok(self)
    }

    /// Finish the table.
    #[must_use]
    pub fn build(self) -> Arc<MemTable> {
        Arc::new(MemTable {
            meta: TableMeta::new(self.columns, self.timestamp_index),
            partitions: self.partitions,
            symbols: self.symbols,
        })
    }
}

/// Factory producing fixed-frame-size cursors over a [`MemTable`].
#[derive(Debug, Clone)]
pub struct MemTableFactory {
    table: Arc<MemTable>,
    rows_per_frame: u64,
}

impl MemTableFactory {
    /// # Errors
    ///
    /// Fails when `rows_per_frame` is zero.
    pub fn new(table: Arc<MemTable>, rows_per_frame: u64) -> Result<Self> {
        if rows_per_frame == 0 {
            return Err(StrataError::InvalidConfig {
                detail: "rows_per_frame must be greater than zero",
            });
        }
        Ok(Self {
            table,
            rows_per_frame,
        })
    }
}

impl RecordCursorFactory for MemTableFactory {
    fn metadata(&self) -> &TableMeta {
        self.table.meta()
    }

    fn page_frame_cursor(&self) -> Result<Box<dyn PageFrameCursor>> {
        Ok(Box::new(MemFrameCursor {
            table: Arc::clone(&self.table),
            rows_per_frame: self.rows_per_frame,
            partition: 0,
            next_row: 0,
        }))
    }
}

/// Cursor cutting each partition into `rows_per_frame`-sized frames, tail
/// clamped, partitions in order.
struct MemFrameCursor {
    table: Arc<MemTable>,
    rows_per_frame: u64,
    partition: usize,
    next_row: u64,
}

impl PageFrameCursor for MemFrameCursor {
    fn next_frame(&mut self) -> Option<PageFrame> {
        loop {
            let part = self.table.partitions.get(self.partition)?;
            if self.next_row >= part.row_count {
                self.partition += 1;
                self.next_row = 0;
                continue;
            }
            let row_lo = self.next_row;
            let row_hi = (row_lo + self.rows_per_frame).min(part.row_count);
            self.next_row = row_hi;
            return Some(PageFrame::new(
                self.partition,
                row_lo,
                row_hi,
                part.columns.clone(),
            ));
        }
    }

    fn to_top(&mut self) {
        self.partition = 0;
        self.next_row = 0;
    }

    fn symbol_table(&self, column: usize) -> Option<Arc<SymbolTable>> {
        self.table.symbols.get(column)?.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_partition_table() -> Arc<MemTable> {
        MemTable::builder(vec![
            ColumnMeta::new("x", ColumnKind::Long),
            ColumnMeta::new("ts", ColumnKind::Timestamp),
        ])
        .partition(vec![(0..10).collect(), (100..110).collect()])
        .unwrap()
        .partition(vec![(10..15).collect(), (110..115).collect()])
        .unwrap()
        .build()
    }

    #[test]
    fn test_frames_cover_all_rows_without_gaps() {
        let factory = MemTableFactory::new(two_partition_table(), 4).unwrap();
        let mut cursor = factory.page_frame_cursor().unwrap();

        let mut frames = Vec::new();
        while let Some(f) = cursor.next_frame() {
            frames.push((f.partition_index(), f.row_lo(), f.row_hi()));
        }
        assert_eq!(
            frames,
            vec![
                (0, 0, 4),
                (0, 4, 8),
                (0, 8, 10),
                (1, 0, 4),
                (1, 4, 5),
            ]
        );
    }

    #[test]
    fn test_to_top_restarts_the_walk() {
        let factory = MemTableFactory::new(two_partition_table(), 8).unwrap();
        let mut cursor = factory.page_frame_cursor().unwrap();
        let first: Vec<u64> = std::iter::from_fn(|| cursor.next_frame().map(|f| f.row_lo())).collect();
        cursor.to_top();
        let second: Vec<u64> = std::iter::from_fn(|| cursor.next_frame().map(|f| f.row_lo())).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_table_has_no_frames() {
        let table = MemTable::builder(vec![ColumnMeta::new("x", ColumnKind::Long)]).build();
        let factory = MemTableFactory::new(table, 16).unwrap();
        let mut cursor = factory.page_frame_cursor().unwrap();
        assert!(cursor.next_frame().is_none());
    }

    #[test]
    fn test_partition_validation() {
        let err = MemTable::builder(vec![
            ColumnMeta::new("a", ColumnKind::Long),
            ColumnMeta::new("b", ColumnKind::Long),
        ])
        .partition(vec![vec![1, 2], vec![3]])
        .unwrap_err();
        assert!(err.to_string().contains("differ in length"));
    }

    #[test]
    fn test_symbol_table_resolution() {
        let table = MemTable::builder(vec![ColumnMeta::new("sensor", ColumnKind::Symbol)])
            .symbol_table(0, SymbolTable::new(vec!["alpha".into(), "beta".into()]))
            .unwrap()
            .partition(vec![vec![0, 1, 0]])
            .unwrap()
            .build();
        let factory = MemTableFactory::new(table, 2).unwrap();
        let cursor = factory.page_frame_cursor().unwrap();
        assert_eq!(cursor.symbol_table(0).unwrap().value_of(1), Some("beta"));
        assert!(cursor.symbol_table(1).is_none());
    }

    #[test]
    fn test_frame_count_zero_rows_per_frame_rejected() {
        let err = MemTableFactory::new(two_partition_table(), 0).unwrap_err();
        assert!(matches!(err, StrataError::InvalidConfig { .. }));
    }

    proptest::proptest! {
        #[test]
        fn prop_frames_tile_every_partition_exactly(
            partition_rows in proptest::collection::vec(0_u64..200, 1..5),
            rows_per_frame in 1_u64..64,
        ) {
            let mut builder = MemTable::builder(vec![ColumnMeta::new("x", ColumnKind::Long)]);
            for &rows in &partition_rows {
                builder = builder.partition(vec![vec![0; rows as usize]]).unwrap();
            }
            let factory = MemTableFactory::new(builder.build(), rows_per_frame).unwrap();
            let mut cursor = factory.page_frame_cursor().unwrap();

            let mut expected_partition = 0;
            let mut expected_row = 0_u64;
            while let Some(frame) = cursor.next_frame() {
                while partition_rows[expected_partition] == 0
                    || expected_row >= partition_rows[expected_partition]
                {
                    expected_partition += 1;
                    expected_row = 0;
                }
                proptest::prop_assert_eq!(frame.partition_index(), expected_partition);
                proptest::prop_assert_eq!(frame.row_lo(), expected_row);
                proptest::prop_assert!(frame.row_count() <= rows_per_frame);
                expected_row = frame.row_hi();
            }
            // nothing left uncovered
            for (p, &rows) in partition_rows.iter().enumerate() {
                if p < expected_partition {
                    continue;
                }
                let covered = if p == expected_partition { expected_row } else { 0 };
                proptest::prop_assert_eq!(covered, rows, "partition {} fully tiled", p);
            }
        }
    }
}
