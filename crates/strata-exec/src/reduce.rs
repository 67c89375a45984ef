//! The reduce job: worker-side consumption of the shared queues.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use strata_ring::cursor;

use crate::bus::{MessageBus, Shard};
use crate::cleanup;
use crate::metrics;
use crate::page_cache::PageFrameRecord;

/// Consume and execute one reduce task on `shard_index`, for any query.
///
/// Returns whether a task was processed. Claim collisions are retried in
/// place; an empty stage reports no work.
pub(crate) fn consume_reduce_once(bus: &MessageBus, shard_index: usize) -> bool {
    let shard = bus.shard(shard_index);
    loop {
        let c = shard.reduce_sub.next();
        if c == cursor::RETRY {
            std::hint::spin_loop();
            continue;
        }
        if c == cursor::NONE {
            return false;
        }
        reduce_task(shard, shard_index, c);
        shard.reduce_sub.done(c);
        return true;
    }
}

/// Run the owning query's reducer over one claimed task.
///
/// The slot stays held for the whole reduction: downstream stages are
/// daisy-chained on the same ring and must never observe a half-reduced
/// task. A reducer error invalidates the owning sequence and is swallowed
/// here; reduce never propagates to the caller thread. The owner's reduce
/// counter advances in every case, valid or not.
fn reduce_task(shard: &Shard, shard_index: usize, c: i64) {
    let mut slot = shard.reduce_ring.slot(c).lock();
    let task = &mut *slot;
    let Some(fs) = task.frame_sequence.clone() else {
        return;
    };
    tracing::debug!(
        shard = shard_index,
        id = fs.id(),
        frame_index = task.frame_index,
        frame_count = fs.frame_count(),
        valid = fs.is_valid(),
        cursor = c,
        "reduce.task"
    );
    if fs.is_valid() {
        debug_assert!(
            !fs.done_latch().is_released(),
            "a live task implies an undrained sequence"
        );
        let mut record = PageFrameRecord::new(fs.cache(), task.frame_index);
        let atom = fs.atom();
        match fs
            .reducer()
            .reduce(&mut record, atom.as_deref(), &mut task.rows)
        {
            Ok(()) => debug_assert!(
                task.rows.len() as u64 <= fs.frame_row_count(task.frame_index),
                "a reducer cannot keep more rows than its frame holds"
            ),
            Err(error) => {
                fs.invalidate();
                metrics::record_reducer_failure();
                tracing::error!(
                    shard = shard_index,
                    id = fs.id(),
                    frame_index = task.frame_index,
                    %error,
                    "reduce.failed"
                );
            }
        }
    }
    fs.note_reduced();
}

/// One worker's long-lived job.
///
/// Each worker owns its own instance: the per-worker shuffled shard
/// permutation gives every thread its own pass order over the shared
/// queues, spreading contention. A tick consumes one dispatch kick, then
/// attempts one reduce and one cleanup task per shard.
pub struct ReduceJob {
    bus: Arc<MessageBus>,
    worker_id: usize,
    shards: Vec<usize>,
    shutdown: Arc<AtomicBool>,
}

impl ReduceJob {
    #[must_use]
    pub fn new(
        bus: Arc<MessageBus>,
        worker_id: usize,
        seed: u64,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let mut shards: Vec<usize> = (0..bus.shard_count()).collect();
        shards.shuffle(&mut SmallRng::seed_from_u64(seed));
        Self {
            bus,
            worker_id,
            shards,
            shutdown,
        }
    }

    #[inline]
    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// One scheduling tick. Returns whether any useful work was done.
    pub fn run_once(&self) -> bool {
        let mut useful = self.consume_dispatch_once();
        for &shard in &self.shards {
            useful |= consume_reduce_once(&self.bus, shard);
        }
        for &shard in &self.shards {
            useful |= cleanup::consume_cleanup_once(&self.bus, shard);
        }
        useful
    }

    /// Consume one dispatch kick and run its sequence's dispatch to
    /// completion, helping the target shard drain while its ring is full.
    fn consume_dispatch_once(&self) -> bool {
        loop {
            let c = self.bus.dispatch_sub.next();
            if c == cursor::RETRY {
                std::hint::spin_loop();
                continue;
            }
            if c == cursor::NONE {
                return false;
            }
            let owner = self.bus.dispatch_ring.slot(c).lock().frame_sequence.take();
            // acknowledge immediately: progress lives on the sequence, and
            // holding the slot would stall other dispatch consumers
            self.bus.dispatch_sub.done(c);
            if let Some(fs) = owner {
                while !fs.run_dispatch_steps() && !self.shutdown.load(Ordering::Acquire) {
                    let mut progressed = consume_reduce_once(&self.bus, fs.shard());
                    progressed |= cleanup::consume_cleanup_once(&self.bus, fs.shard());
                    if !progressed {
                        std::thread::yield_now();
                    }
                }
            }
            return true;
        }
    }
}

impl std::fmt::Debug for ReduceJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReduceJob")
            .field("worker_id", &self.worker_id)
            .field("shard_order", &self.shards)
            .finish()
    }
}
