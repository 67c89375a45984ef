//! The per-frame computation and its canonical implementation.

use std::any::Any;
use std::sync::Arc;

use strata_error::{Result, StrataError};

use crate::page_cache::PageFrameRecord;

/// The per-frame computation of a query.
///
/// Implementations must be side-effect-free except for `rows` (they may
/// read `atom`), and must report fatal data errors by returning `Err`;
/// the reduce job invalidates the owning sequence and swallows the error;
/// nothing propagates across threads.
pub trait FrameReducer: Send + Sync {
    /// Reduce one frame: append surviving partition-local row ids to
    /// `rows`. `record` arrives bound to the frame's first row.
    ///
    /// # Errors
    ///
    /// A returned error marks the owning query invalid; remaining work
    /// fast-drains.
    fn reduce(
        &self,
        record: &mut PageFrameRecord,
        atom: Option<&(dyn Any + Send + Sync)>,
        rows: &mut Vec<u64>,
    ) -> Result<()>;

    /// Rewind any per-execution state for a restart.
    fn to_top(&self) {}
}

/// A row predicate over a positioned record.
pub trait RowPredicate: Send + Sync {
    /// Whether the record's current row survives.
    ///
    /// # Errors
    ///
    /// A returned error is a fatal data error for the whole query.
    fn test(&self, record: &PageFrameRecord) -> Result<bool>;
}

impl<F> RowPredicate for F
where
    F: Fn(&PageFrameRecord) -> bool + Send + Sync,
{
    fn test(&self, record: &PageFrameRecord) -> Result<bool> {
        Ok(self(record))
    }
}

/// Wrap a closure as a shared predicate.
#[must_use]
pub fn predicate<F>(f: F) -> Arc<dyn RowPredicate>
where
    F: Fn(&PageFrameRecord) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-query reducer parameters for a filter scan: the compiled predicate.
///
/// Carried as the sequence's opaque atom so the shared reduce ring stays
/// type-erased across concurrent queries.
pub struct FilterAtom {
    predicate: Arc<dyn RowPredicate>,
}

impl FilterAtom {
    #[must_use]
    pub fn new(predicate: Arc<dyn RowPredicate>) -> Self {
        Self { predicate }
    }
}

/// The canonical reducer: scan a frame's rows, keep the survivors.
#[derive(Default)]
pub struct FilterReducer;

impl FrameReducer for FilterReducer {
    fn reduce(
        &self,
        record: &mut PageFrameRecord,
        atom: Option<&(dyn Any + Send + Sync)>,
        rows: &mut Vec<u64>,
    ) -> Result<()> {
        let atom = atom
            .and_then(|a| a.downcast_ref::<FilterAtom>())
            .ok_or_else(|| StrataError::ReducerFailed {
                frame_index: record.frame_index(),
                detail: "filter reducer requires a FilterAtom".to_owned(),
            })?;

        let (row_lo, row_hi) = record.frame_row_bounds();
        for row in row_lo..row_hi {
            record.set_row(row);
            if atom.predicate.test(record)? {
                rows.push(row);
            }
        }
        Ok(())
    }
}
