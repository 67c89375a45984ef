//! Asynchronous page-frame execution pipeline.
//!
//! A filtered table scan is executed by decomposing the table into
//! page-aligned row ranges (frames) and flowing them through four stages
//! over shared, bounded ring queues:
//!
//! 1. **Dispatch**: the query's [`FrameSequence`] walks the reader once,
//!    caches every frame's column addresses, and publishes one reduce task
//!    per frame into a randomly chosen shard's reduce ring.
//! 2. **Reduce**: worker threads (and the stalled foreground, by
//!    stealing) pop reduce tasks from any shard, run the query's reducer
//!    over the frame, and release the task downstream.
//! 3. **Collect**: the foreground's [`ScanCursor`], subscribed to its
//!    shard's collect fan-out, filters tasks by frame-sequence identity and
//!    yields surviving rows to the caller, honoring LIMIT.
//! 4. **Cleanup**: a tail subscriber reclaims released tasks in place and
//!    signals the sequence's done-latch once the round has fully drained.
//!
//! Many concurrent queries interleave on one small set of shard queues;
//! identity filtering keeps their results apart. Cancellation is a single
//! monotonic validity flag: in-flight reducers finish, everything else
//! fast-drains.

pub mod bus;
pub mod cleanup;
pub mod collect;
pub mod config;
pub mod context;
pub mod frame_sequence;
pub mod metrics;
pub mod page_cache;
pub mod reduce;
pub mod reducer;
pub mod scan;
pub mod task;
pub mod worker;

pub use bus::MessageBus;
pub use collect::ScanCursor;
pub use config::ExecConfig;
pub use context::ExecutionContext;
pub use frame_sequence::{FrameSequence, ReduceAtom};
pub use metrics::{ExecMetrics, exec_metrics, reset_exec_metrics};
pub use page_cache::{PageAddressCache, PageFrameRecord};
pub use reduce::ReduceJob;
pub use reducer::{FilterAtom, FilterReducer, FrameReducer, RowPredicate, predicate};
pub use scan::FilterScan;
pub use task::{DispatchTask, ReduceTask};
pub use worker::WorkerPool;
