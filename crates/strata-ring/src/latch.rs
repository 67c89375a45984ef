//! Single-shot drained signal for a frame sequence.

use std::sync::atomic::{AtomicBool, Ordering};

/// Released exactly once per execution round, when a frame sequence has
/// fully drained and is safe to reset. `arm()` rewinds it for the next
/// round (pooled reuse, `to_top`).
///
/// Waiting is the caller's business; the pipeline busy-helps instead of
/// blocking, so the latch is just a flag.
#[derive(Debug)]
pub struct DoneLatch {
    released: AtomicBool,
}

impl DoneLatch {
    /// A latch armed for one round.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
        }
    }

    /// Release the latch. Returns `true` on the releasing call, `false`
    /// on replays.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// Whether the latch has been released.
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Re-arm for the next round.
    pub fn arm(&self) {
        self.released.store(false, Ordering::Release);
    }
}

impl Default for DoneLatch {
    fn default() -> Self {
        Self::new()
    }
}
