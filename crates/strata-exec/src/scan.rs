//! The user-facing filtered-scan surface.

use std::sync::Arc;

use strata_error::Result;
use strata_ring::ScSubscriber;
use strata_storage::RecordCursorFactory;

use crate::collect::ScanCursor;
use crate::context::ExecutionContext;
use crate::frame_sequence::{FrameSequence, ReduceAtom};
use crate::reducer::{FilterAtom, FilterReducer, RowPredicate};

/// A filtered table scan: a reader factory, a row predicate and an
/// optional row limit, executable any number of times.
pub struct FilterScan {
    factory: Arc<dyn RecordCursorFactory>,
    predicate: Arc<dyn RowPredicate>,
    limit: Option<u64>,
}

impl FilterScan {
    #[must_use]
    pub fn new(factory: Arc<dyn RecordCursorFactory>, predicate: Arc<dyn RowPredicate>) -> Self {
        Self {
            factory,
            predicate,
            limit: None,
        }
    }

    /// Cap the number of rows the cursor will emit.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Dispatch the scan and return its collect cursor.
    ///
    /// # Errors
    ///
    /// Fails only on reader-open problems; after a successful dispatch all
    /// status travels through the sequence's validity flag.
    pub fn execute(&self, ctx: &ExecutionContext) -> Result<ScanCursor> {
        let fs = FrameSequence::new(Arc::clone(ctx.bus()), Arc::new(FilterReducer));
        let sub = Arc::new(ScSubscriber::unattached());
        let atom: ReduceAtom = Arc::new(FilterAtom::new(Arc::clone(&self.predicate)));
        fs.dispatch(self.factory.as_ref(), ctx, Arc::clone(&sub), Some(atom))?;
        Ok(ScanCursor::new(fs, sub, self.limit))
    }
}

impl std::fmt::Debug for FilterScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterScan")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
