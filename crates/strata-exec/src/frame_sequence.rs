//! Per-query execution state: dispatch, helping, cancellation, reset.
//!
//! A [`FrameSequence`] is the spine of one query execution. `dispatch()`
//! walks the reader once, caches frame addresses, binds the query to a
//! shard and publishes a dispatch kick; workers (or any stalled thread,
//! by stealing) then expand that kick into one reduce task per frame.
//!
//! ## Rentable dispatch
//!
//! Frame publication is re-entrant: progress is the saved
//! `dispatch_start` index guarded by a try-lock, never state in a queue
//! slot, so any thread may resume it after back-pressure and re-entry is
//! idempotent. The dispatch-queue slot is only a kick and is acknowledged
//! the moment it is consumed.
//!
//! ## Cancellation
//!
//! `invalidate()` is the sole cancellation primitive and is monotonic
//! (`true → false` once, never back within a round). It does not stop
//! in-flight reducers; it tells future work to skip and fast-drain.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use strata_error::{Result, StrataError};
use strata_ring::{DoneLatch, ScSubscriber, cursor};
use strata_storage::{PageFrameCursor, RecordCursorFactory};

use crate::bus::MessageBus;
use crate::context::ExecutionContext;
use crate::metrics;
use crate::page_cache::PageAddressCache;
use crate::reducer::FrameReducer;
use crate::{cleanup, reduce};

/// Opaque per-query reducer parameters.
pub type ReduceAtom = Arc<dyn Any + Send + Sync>;

/// Per-query state threading one scan through the shared pipeline.
pub struct FrameSequence {
    bus: Arc<MessageBus>,
    reducer: Arc<dyn FrameReducer>,

    id: AtomicU64,
    shard: AtomicUsize,
    frame_count: AtomicUsize,
    valid: AtomicBool,
    reduce_counter: AtomicUsize,
    cleaned_counter: AtomicUsize,
    done_latch: DoneLatch,

    /// Next frame index to publish; meaningful only to the holder of
    /// `dispatch_lock`, readable by anyone.
    dispatch_start: AtomicUsize,
    dispatch_lock: Mutex<()>,

    cache: ArcSwap<PageAddressCache>,
    atom: RwLock<Option<ReduceAtom>>,
    reader: Mutex<Option<Box<dyn PageFrameCursor>>>,
    collect_sub: RwLock<Option<Arc<ScSubscriber>>>,
}

impl FrameSequence {
    /// A reusable, idle sequence bound to `bus` and `reducer`.
    #[must_use]
    pub fn new(bus: Arc<MessageBus>, reducer: Arc<dyn FrameReducer>) -> Arc<Self> {
        let latch = DoneLatch::new();
        // idle state: nothing in flight, safe to dispatch
        latch.release();
        Arc::new(Self {
            bus,
            reducer,
            id: AtomicU64::new(0),
            shard: AtomicUsize::new(0),
            frame_count: AtomicUsize::new(0),
            valid: AtomicBool::new(true),
            reduce_counter: AtomicUsize::new(0),
            cleaned_counter: AtomicUsize::new(0),
            done_latch: latch,
            dispatch_start: AtomicUsize::new(0),
            dispatch_lock: Mutex::new(()),
            cache: ArcSwap::from_pointee(PageAddressCache::empty()),
            atom: RwLock::new(None),
            reader: Mutex::new(None),
            collect_sub: RwLock::new(None),
        })
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Open the reader, cache every frame's addresses, bind to a shard and
    /// publish the dispatch kick.
    ///
    /// The collect subscriber is attached to the shard's fan-out before
    /// anything is published, so no frame of this query can slip past it.
    /// With zero frames the reader is released immediately and nothing is
    /// published or attached.
    ///
    /// # Errors
    ///
    /// Fails when the reader cannot be opened or a previous round of this
    /// sequence is still draining. This is the last point an error can
    /// surface to the caller; from here on status lives in the validity
    /// flag.
    pub fn dispatch(
        self: &Arc<Self>,
        factory: &dyn RecordCursorFactory,
        ctx: &ExecutionContext,
        collect_sub: Arc<ScSubscriber>,
        atom: Option<ReduceAtom>,
    ) -> Result<()> {
        if !self.done_latch.is_released() {
            return Err(StrataError::SequenceBusy);
        }

        let mut reader = factory.page_frame_cursor()?;

        // pass one: capture page addresses; a separate pass so no reader
        // re-entry can overlap the cache build
        let column_count = factory.metadata().column_count();
        let mut cache = PageAddressCache::with_symbols(
            (0..column_count).map(|c| reader.symbol_table(c)).collect(),
        );
        while let Some(frame) = reader.next_frame() {
            cache.add(&frame);
        }
        let frame_count = cache.frame_count();

        let shard = ctx.random_shard();
        let id = ctx.next_sequence_id();

        self.id.store(id, Ordering::Release);
        self.shard.store(shard, Ordering::Release);
        self.valid.store(true, Ordering::Release);
        self.reduce_counter.store(0, Ordering::Release);
        self.cleaned_counter.store(0, Ordering::Release);
        self.dispatch_start.store(0, Ordering::Release);
        self.frame_count.store(frame_count, Ordering::Release);
        self.cache.store(Arc::new(cache));
        *self.atom.write() = atom;
        *self.collect_sub.write() = Some(Arc::clone(&collect_sub));

        tracing::debug!(shard, id, frame_count, "frame_sequence.dispatch");

        if frame_count == 0 {
            // an undispatched reader would dangle if kept
            drop(reader);
            *self.reader.lock() = None;
            return Ok(());
        }

        *self.reader.lock() = Some(reader);
        self.done_latch.arm();
        self.bus.shard(shard).collect_fan_out.attach(&collect_sub);
        self.publish_dispatch_task();
        Ok(())
    }

    /// Busy-help until this round has fully drained.
    ///
    /// Each turn re-enters rentable dispatch, releases one cursor from this
    /// query's own collect subscriber (without touching slot payloads;
    /// anything still uncollected here is abandoned), and consumes one
    /// reduce and one cleanup task on this shard. This is the foreground's
    /// contribution to forward progress; it also quiesces cursors closed
    /// before full consumption.
    pub fn await_done(self: &Arc<Self>) {
        while !self.done_latch.is_released() {
            let mut useful = self.steal_dispatch_queue();
            useful |= self.drain_collect_one();
            useful |= reduce::consume_reduce_once(&self.bus, self.shard());
            useful |= cleanup::consume_cleanup_once(&self.bus, self.shard());
            if !useful {
                std::thread::yield_now();
            }
        }
    }

    /// Final reset after a drained round: clears the page-address cache,
    /// releases the reader, zeroes counters. The sequence is idle and
    /// reusable afterwards.
    pub fn clear(&self) {
        debug_assert!(
            self.done_latch.is_released(),
            "clear() requires a drained sequence"
        );
        self.cache.store(Arc::new(PageAddressCache::empty()));
        *self.reader.lock() = None;
        *self.atom.write() = None;
        if let Some(sub) = self.collect_sub.write().take() {
            // terminal cleanup already detached it; rounds that never
            // attached (zero frames) make this a no-op
            self.bus.shard(self.shard()).collect_fan_out.detach(&sub);
        }
        self.frame_count.store(0, Ordering::Release);
        self.reduce_counter.store(0, Ordering::Release);
        self.cleaned_counter.store(0, Ordering::Release);
        self.dispatch_start.store(0, Ordering::Release);
        tracing::debug!(id = self.id(), "frame_sequence.clear");
    }

    /// Rewind the reader and re-publish this sequence from frame 0,
    /// keeping its identity.
    ///
    /// The current round is first helped to quiescence, because interleaving two
    /// rounds of one identity on the shared ring would corrupt the
    /// collector's frame order.
    pub fn to_top(self: &Arc<Self>) {
        if self.frame_count.load(Ordering::Acquire) == 0 {
            return;
        }
        self.await_done();

        if let Some(reader) = self.reader.lock().as_mut() {
            reader.to_top();
        }
        self.reduce_counter.store(0, Ordering::Release);
        self.cleaned_counter.store(0, Ordering::Release);
        self.dispatch_start.store(0, Ordering::Release);
        self.done_latch.arm();
        if let Some(sub) = self.collect_sub.read().clone() {
            self.bus.shard(self.shard()).collect_fan_out.attach(&sub);
        }
        tracing::debug!(shard = self.shard(), id = self.id(), "frame_sequence.to_top");
        self.publish_dispatch_task();
    }

    /// Monotonic cancellation: in-flight reducers finish, everything else
    /// fast-drains.
    pub fn invalidate(&self) {
        if self
            .valid
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(shard = self.shard(), id = self.id(), "frame_sequence.invalidated");
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------
    // Rentable dispatch and helping
    // -----------------------------------------------------------------

    /// One bounded pass of frame publication from the saved index.
    ///
    /// Returns whether dispatch is complete for this sequence. Re-entrant:
    /// losing the try-lock means another thread is already publishing.
    /// Publication continues even after the sequence turns invalid:
    /// reducers short-circuit, and collectors need every frame to drain.
    pub(crate) fn run_dispatch_steps(self: &Arc<Self>) -> bool {
        let Some(_guard) = self.dispatch_lock.try_lock() else {
            return self.dispatch_complete();
        };
        let frame_count = self.frame_count.load(Ordering::Acquire);
        let mut index = self.dispatch_start.load(Ordering::Acquire);
        if index >= frame_count {
            return true;
        }
        let shard = self.bus.shard(self.shard());
        while index < frame_count {
            let c = shard.reduce_pub.next();
            if c == cursor::NONE {
                metrics::record_dispatch_stall();
                self.dispatch_start.store(index, Ordering::Release);
                return false;
            }
            {
                let mut task = shard.reduce_ring.slot(c).lock();
                task.frame_sequence = Some(Arc::clone(self));
                task.frame_index = index;
                task.rows.clear();
                task.collected = false;
            }
            shard.reduce_pub.done(c);
            index += 1;
        }
        self.dispatch_start.store(frame_count, Ordering::Release);
        true
    }

    /// Whether every frame of the current round has been published.
    #[must_use]
    pub fn dispatch_complete(&self) -> bool {
        self.dispatch_start.load(Ordering::Acquire) >= self.frame_count.load(Ordering::Acquire)
    }

    /// Re-enter rentable dispatch for this sequence, then consume one
    /// dispatch kick off the queue if one is pending (running a bounded
    /// pass for its owner). Returns whether a kick was consumed.
    pub fn steal_dispatch_queue(self: &Arc<Self>) -> bool {
        self.run_dispatch_steps();
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
            self.bus.dispatch_sub.done(c);
            if let Some(owner) = owner {
                // progress lives on the sequence; its foreground re-enters
                // on every collect/await turn, so one pass is enough help
                owner.run_dispatch_steps();
            }
            return true;
        }
    }

    /// One unit of stealing on this sequence's shard: a dispatch pass,
    /// then one reduce and one cleanup task for any query.
    pub(crate) fn steal_work(self: &Arc<Self>) -> bool {
        metrics::record_steal();
        self.run_dispatch_steps();
        let mut useful = reduce::consume_reduce_once(&self.bus, self.shard());
        useful |= cleanup::consume_cleanup_once(&self.bus, self.shard());
        useful
    }

    /// Release one cursor from this query's own collect subscriber without
    /// touching the slot. Only used on quiescence paths (`await_done`,
    /// `to_top`), where anything still pending is not going to be emitted;
    /// not mutating the slot keeps a release racing a detach harmless.
    fn drain_collect_one(&self) -> bool {
        if let Some(sub) = self.collect_sub.read().clone() {
            let c = sub.next();
            if c >= 0 {
                sub.done(c);
                return true;
            }
        }
        false
    }

    /// Publish a dispatch kick, helping and yielding while the dispatch
    /// queue is full.
    fn publish_dispatch_task(self: &Arc<Self>) {
        loop {
            let c = self.bus.dispatch_pub.next();
            if c >= 0 {
                self.bus.dispatch_ring.slot(c).lock().frame_sequence = Some(Arc::clone(self));
                self.bus.dispatch_pub.done(c);
                return;
            }
            if !self.steal_dispatch_queue() {
                std::thread::yield_now();
            }
        }
    }

    // -----------------------------------------------------------------
    // Stage accounting
    // -----------------------------------------------------------------

    /// One reduce task of this sequence finished; a skipped or failed
    /// reducer counts the same as a successful one.
    pub(crate) fn note_reduced(&self) {
        self.reduce_counter.fetch_add(1, Ordering::AcqRel);
        metrics::record_reduce_task();
    }

    /// One reduce task of this sequence was reclaimed by cleanup. The last
    /// reclaim performs the terminal release: detach the collect
    /// subscriber and open the done-latch.
    pub(crate) fn note_frame_reclaimed(&self) {
        let cleaned = self.cleaned_counter.fetch_add(1, Ordering::AcqRel) + 1;
        let frame_count = self.frame_count.load(Ordering::Acquire);
        if cleaned == frame_count {
            debug_assert_eq!(
                self.reduce_counter.load(Ordering::Acquire),
                frame_count,
                "cleanup sits behind reduce in the chain"
            );
            if let Some(sub) = self.collect_sub.read().clone() {
                self.bus.shard(self.shard()).collect_fan_out.detach(&sub);
            }
            tracing::debug!(
                shard = self.shard(),
                id = self.id(),
                frame_count,
                "cleanup.sequence_drained"
            );
            self.done_latch.release();
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn shard(&self) -> usize {
        self.shard.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frame_count.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn reduce_counter(&self) -> usize {
        self.reduce_counter.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn done_latch(&self) -> &DoneLatch {
        &self.done_latch
    }

    /// The installed page-address cache (empty when idle).
    #[must_use]
    pub fn cache(&self) -> Arc<PageAddressCache> {
        self.cache.load_full()
    }

    /// Row count of one cached frame.
    #[must_use]
    pub fn frame_row_count(&self, frame_index: usize) -> u64 {
        self.cache.load().frame_row_count(frame_index)
    }

    /// The opaque reducer parameters of the current round.
    #[must_use]
    pub fn atom(&self) -> Option<ReduceAtom> {
        self.atom.read().clone()
    }

    #[inline]
    #[must_use]
    pub fn reducer(&self) -> &Arc<dyn FrameReducer> {
        &self.reducer
    }

    #[inline]
    #[must_use]
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }
}

impl std::fmt::Debug for FrameSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSequence")
            .field("id", &self.id())
            .field("shard", &self.shard())
            .field("frame_count", &self.frame_count())
            .field("valid", &self.is_valid())
            .field("reduced", &self.reduce_counter())
            .field("drained", &self.done_latch.is_released())
            .finish()
    }
}
