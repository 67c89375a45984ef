//! Fan-out barrier: one publisher-side view over many subscribers.
//!
//! Membership is an immutable snapshot vector behind an `ArcSwap` pointer.
//! Attach and detach rebuild the vector and install it with RCU; gate
//! readers load the pointer once per call, so membership changes are
//! lock-free against them. Detachment is therefore asynchronous: a reader
//! holding the previous snapshot may keep honoring a detached member for
//! one more gate computation, which delays a release but never loses it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use arc_swap::ArcSwap;

use crate::cache_aligned::CacheAligned;
use crate::cursor;
use crate::metrics;
use crate::seq::{Gate, ScSubscriber};

/// A dynamically sized set of subscribers composed behind one stage.
///
/// The fan-out's position is the slowest member's; with no members it
/// passes the upstream gate through. The position is clamped monotonic so
/// a detachment (which can only raise the minimum) never appears to move
/// the gate backward to a racing reader.
pub struct FanOut {
    members: ArcSwap<Vec<Arc<ScSubscriber>>>,
    upstream: Arc<dyn Gate>,
    floor: CacheAligned<AtomicI64>,
}

impl FanOut {
    /// An empty fan-out chained behind `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn Gate>) -> Self {
        Self {
            members: ArcSwap::from_pointee(Vec::new()),
            upstream,
            floor: CacheAligned::new(AtomicI64::new(cursor::START)),
        }
    }

    /// Attach a subscriber.
    ///
    /// The newcomer is bound to this fan-out's upstream and positioned at
    /// the upstream frontier before it becomes visible, so it only observes
    /// cursors released upstream after this call and can never drag the
    /// fan-out's minimum backward (every existing member's position is at
    /// or below the upstream frontier).
    pub fn attach(&self, sub: &Arc<ScSubscriber>) {
        sub.bind_upstream(Arc::clone(&self.upstream));
        sub.set_position(self.upstream.position());
        self.members.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(sub));
            next
        });
        metrics::record_fanout_attach();
    }

    /// Detach a subscriber by identity. Detaching a member that is not
    /// attached is a no-op.
    pub fn detach(&self, sub: &Arc<ScSubscriber>) {
        self.members.rcu(|current| {
            current
                .iter()
                .filter(|m| !Arc::ptr_eq(m, sub))
                .cloned()
                .collect::<Vec<_>>()
        });
        metrics::record_fanout_detach();
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.load().len()
    }
}

impl Gate for FanOut {
    fn can_pass(&self, cursor: i64) -> bool {
        cursor <= self.position()
    }

    fn position(&self) -> i64 {
        let members = self.members.load();
        let min = members
            .iter()
            .map(|m| m.position())
            .min()
            .unwrap_or_else(|| self.upstream.position());
        let prev = self.floor.fetch_max(min, Ordering::AcqRel);
        min.max(prev)
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("members", &self.member_count())
            .field("floor", &self.floor.load(Ordering::Relaxed))
            .finish()
    }
}
