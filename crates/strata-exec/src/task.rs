//! Queue slot payloads.
//!
//! Slots are allocated once with their ring and reused for the life of the
//! process; per-message state is cleared, never reallocated. The row list
//! in a reduce task is the one heap buffer on the reduce path, and it is
//! amortized the same way.

use std::sync::Arc;

use crate::frame_sequence::FrameSequence;

/// One frame's unit of reduce work.
///
/// `frame_sequence` identifies the owning query; every consumer of the
/// shared reduce ring must compare it (by identity) before acting on the
/// task. `rows` holds the surviving partition-local row ids written by the
/// reducer, owned by the slot and only borrowed by the collector between
/// its claim and release.
#[derive(Default)]
pub struct ReduceTask {
    pub frame_sequence: Option<Arc<FrameSequence>>,
    pub frame_index: usize,
    pub rows: Vec<u64>,
    pub collected: bool,
}

impl ReduceTask {
    /// Whether this slot currently belongs to `fs`.
    #[inline]
    #[must_use]
    pub fn belongs_to(&self, fs: &Arc<FrameSequence>) -> bool {
        self.frame_sequence
            .as_ref()
            .is_some_and(|owner| Arc::ptr_eq(owner, fs))
    }
}

impl std::fmt::Debug for ReduceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReduceTask")
            .field("frame_index", &self.frame_index)
            .field("rows", &self.rows.len())
            .field("collected", &self.collected)
            .field("owned", &self.frame_sequence.is_some())
            .finish()
    }
}

/// A request to run a frame sequence's rentable dispatch.
///
/// The slot is acknowledged as soon as it is consumed; dispatch progress
/// lives on the frame sequence itself, never in the queue.
#[derive(Default)]
pub struct DispatchTask {
    pub frame_sequence: Option<Arc<FrameSequence>>,
}

impl std::fmt::Debug for DispatchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTask")
            .field("owned", &self.frame_sequence.is_some())
            .finish()
    }
}
