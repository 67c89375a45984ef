//! Publisher and subscriber sequences.
//!
//! A ring's stages form a chain: the publisher claims cursors gated by the
//! chain's final stage plus the ring capacity, and each subscriber stage
//! claims cursors gated by the stage before it. Stages are constructed in
//! chain order (each takes its upstream [`Gate`]), with the publisher last.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::cache_aligned::CacheAligned;
use crate::cursor::{self, SeqCounter};
use crate::metrics;
use crate::ring::Availability;

/// Upstream view a stage gates on.
pub trait Gate: Send + Sync {
    /// Whether `cursor` has been released by this stage.
    fn can_pass(&self, cursor: i64) -> bool;

    /// Highest cursor contiguously released by this stage.
    fn position(&self) -> i64;
}

// ---------------------------------------------------------------------------
// Publishers
// ---------------------------------------------------------------------------

/// Multi-producer publisher sequence.
///
/// `next()` reserves a cursor with a CAS (internally retrying claim
/// collisions) and returns [`cursor::NONE`] when the slowest stage of the
/// chain is a full ring behind. `done(c)` publishes slot `c` through the
/// ring's availability cells; publication may be out of claim order across
/// producers.
pub struct MpPublisher {
    claim: SeqCounter,
    gate_cache: CacheAligned<AtomicI64>,
    gate: Arc<dyn Gate>,
    availability: Arc<Availability>,
    capacity: i64,
}

impl MpPublisher {
    /// A publisher gated by `gate`, publishing through `availability`.
    #[must_use]
    pub fn new(availability: Arc<Availability>, gate: Arc<dyn Gate>, capacity: usize) -> Self {
        Self {
            claim: SeqCounter::new(),
            gate_cache: CacheAligned::new(AtomicI64::new(cursor::START)),
            gate,
            availability,
            capacity: capacity as i64,
        }
    }

    /// Claim the next cursor, or [`cursor::NONE`] when the ring is full.
    pub fn next(&self) -> i64 {
        let mut current = self.claim.load();
        loop {
            let next = current + 1;
            if !self.has_room(next) {
                metrics::record_publisher_full();
                return cursor::NONE;
            }
            match self.claim.cas(current, next) {
                Ok(_) => return next,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Publish slot `cursor`. The slot must be fully written first.
    #[inline]
    pub fn done(&self, cursor: i64) {
        self.availability.publish(cursor);
    }

    /// Cursor claims gate on the chain's final stage: `next` fits iff that
    /// stage has released `next - capacity`.
    fn has_room(&self, next: i64) -> bool {
        let min_gate = next - self.capacity;
        let mut cached = self.gate_cache.load(Ordering::Relaxed);
        if cached < min_gate {
            cached = self.gate.position();
            self.gate_cache.store(cached, Ordering::Relaxed);
        }
        cached >= min_gate
    }
}

/// Single-producer publisher sequence.
///
/// Same gating as [`MpPublisher`] without the claim CAS; only one thread
/// may call `next()`/`done()`.
pub struct SpPublisher {
    claim: SeqCounter,
    gate: Arc<dyn Gate>,
    availability: Arc<Availability>,
    capacity: i64,
}

impl SpPublisher {
    #[must_use]
    pub fn new(availability: Arc<Availability>, gate: Arc<dyn Gate>, capacity: usize) -> Self {
        Self {
            claim: SeqCounter::new(),
            gate,
            availability,
            capacity: capacity as i64,
        }
    }

    /// Claim the next cursor, or [`cursor::NONE`] when the ring is full.
    pub fn next(&self) -> i64 {
        let next = self.claim.load() + 1;
        if self.gate.position() < next - self.capacity {
            metrics::record_publisher_full();
            return cursor::NONE;
        }
        self.claim.store(next);
        next
    }

    /// Publish slot `cursor`.
    #[inline]
    pub fn done(&self, cursor: i64) {
        self.availability.publish(cursor);
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Multi-consumer subscriber sequence.
///
/// Consumers share one claim cursor; `next()` returns [`cursor::RETRY`] on
/// a claim collision so the caller can spin or move on. `done(c)` keeps the
/// stage's released frontier contiguous by waiting for `c - 1`. Claims are
/// sequential, so the predecessor's owner is always live and the wait is
/// bounded by one task's processing time.
pub struct McSubscriber {
    claim: SeqCounter,
    done: SeqCounter,
    upstream: Arc<dyn Gate>,
}

impl McSubscriber {
    #[must_use]
    pub fn new(upstream: Arc<dyn Gate>) -> Self {
        Self {
            claim: SeqCounter::new(),
            done: SeqCounter::new(),
            upstream,
        }
    }

    /// Claim the next cursor: a cursor, [`cursor::NONE`] when nothing is
    /// released upstream, or [`cursor::RETRY`] on a claim collision.
    pub fn next(&self) -> i64 {
        let current = self.claim.load();
        let next = current + 1;
        if !self.upstream.can_pass(next) {
            return cursor::NONE;
        }
        match self.claim.cas(current, next) {
            Ok(_) => next,
            Err(_) => {
                metrics::record_claim_collision();
                cursor::RETRY
            }
        }
    }

    /// Release `cursor` downstream.
    pub fn done(&self, cursor: i64) {
        while self.done.cas(cursor - 1, cursor).is_err() {
            std::hint::spin_loop();
        }
    }
}

impl Gate for McSubscriber {
    #[inline]
    fn can_pass(&self, cursor: i64) -> bool {
        cursor <= self.done.load()
    }

    #[inline]
    fn position(&self) -> i64 {
        self.done.load()
    }
}

/// Single-consumer subscriber sequence.
///
/// One owner thread claims and releases; other threads only observe the
/// done frontier through [`Gate`]. The subscriber may be created
/// unattached and bound to an upstream later (fan-out attachment picks the
/// upstream when the owning query picks its shard), and repositioned while
/// quiescent.
pub struct ScSubscriber {
    claim: SeqCounter,
    done: SeqCounter,
    upstream: parking_lot::RwLock<Option<Arc<dyn Gate>>>,
}

impl ScSubscriber {
    #[must_use]
    pub fn new(upstream: Arc<dyn Gate>) -> Self {
        Self {
            claim: SeqCounter::new(),
            done: SeqCounter::new(),
            upstream: parking_lot::RwLock::new(Some(upstream)),
        }
    }

    /// A subscriber with no upstream yet; `next()` reports nothing
    /// available until [`bind_upstream`](Self::bind_upstream) is called.
    #[must_use]
    pub fn unattached() -> Self {
        Self {
            claim: SeqCounter::new(),
            done: SeqCounter::new(),
            upstream: parking_lot::RwLock::new(None),
        }
    }

    /// Bind (or rebind) the upstream this subscriber gates on. Only valid
    /// while the subscriber is quiescent.
    pub fn bind_upstream(&self, upstream: Arc<dyn Gate>) {
        *self.upstream.write() = Some(upstream);
    }

    /// Claim the next cursor, or [`cursor::NONE`] when nothing is released
    /// upstream.
    pub fn next(&self) -> i64 {
        let next = self.claim.load() + 1;
        let can_pass = self
            .upstream
            .read()
            .as_ref()
            .is_some_and(|u| u.can_pass(next));
        if !can_pass {
            return cursor::NONE;
        }
        self.claim.store(next);
        next
    }

    /// Release `cursor` downstream. Calls arrive in claim order.
    #[inline]
    pub fn done(&self, cursor: i64) {
        self.done.store(cursor);
    }

    /// Reposition a quiescent subscriber at `position`.
    ///
    /// Used when attaching to a fan-out: the subscriber starts at the
    /// stream's current frontier and only observes cursors published after
    /// the attachment.
    pub fn set_position(&self, position: i64) {
        self.claim.store(position);
        self.done.store(position);
    }
}

impl Gate for ScSubscriber {
    #[inline]
    fn can_pass(&self, cursor: i64) -> bool {
        cursor <= self.done.load()
    }

    #[inline]
    fn position(&self) -> i64 {
        self.done.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingBuffer;
    use std::collections::HashSet;
    use std::thread;

    fn chain_spsc(capacity: usize) -> (SpPublisher, Arc<ScSubscriber>, Arc<Availability>) {
        let avail = Arc::new(Availability::new(capacity));
        let sub = Arc::new(ScSubscriber::new(avail.clone() as Arc<dyn Gate>));
        let publisher = SpPublisher::new(avail.clone(), sub.clone() as Arc<dyn Gate>, capacity);
        (publisher, sub, avail)
    }

    #[test]
    fn test_spsc_order_and_capacity() {
        let (publisher, sub, _) = chain_spsc(4);

        // Fill the ring.
        for expected in 0..4 {
            let c = publisher.next();
            assert_eq!(c, expected);
            publisher.done(c);
        }
        assert_eq!(publisher.next(), cursor::NONE, "ring is full");

        // Drain in order; each release frees exactly one publisher slot.
        for expected in 0..4 {
            let c = sub.next();
            assert_eq!(c, expected);
            sub.done(c);
            assert_eq!(publisher.next(), expected + 4);
            publisher.done(expected + 4);
        }
    }

    #[test]
    fn test_subscriber_sees_nothing_before_publication() {
        let avail = Arc::new(Availability::new(4));
        let sub = ScSubscriber::new(avail.clone() as Arc<dyn Gate>);
        assert_eq!(sub.next(), cursor::NONE);
        avail.publish(0);
        assert_eq!(sub.next(), 0);
        assert_eq!(sub.next(), cursor::NONE);
    }

    #[test]
    fn test_mp_publication_out_of_order_gates_subscriber() {
        let avail = Arc::new(Availability::new(8));
        let sub = Arc::new(ScSubscriber::new(avail.clone() as Arc<dyn Gate>));
        let publisher = MpPublisher::new(avail.clone(), sub.clone() as Arc<dyn Gate>, 8);

        let c0 = publisher.next();
        let c1 = publisher.next();
        assert_eq!((c0, c1), (0, 1));
        publisher.done(c1);
        assert_eq!(sub.next(), cursor::NONE, "cursor 0 unpublished blocks 1");
        publisher.done(c0);
        assert_eq!(sub.next(), 0);
        assert_eq!(sub.next(), 1);
    }

    #[test]
    fn test_mc_collision_is_transient() {
        let avail = Arc::new(Availability::new(4));
        let sub = Arc::new(McSubscriber::new(avail.clone() as Arc<dyn Gate>));
        avail.publish(0);
        avail.publish(1);
        // A single-threaded claim never collides; both cursors drain.
        assert_eq!(sub.next(), 0);
        sub.done(0);
        assert_eq!(sub.next(), 1);
        sub.done(1);
        assert_eq!(sub.next(), cursor::NONE);
    }

    #[test]
    fn test_mpmc_exactly_once_delivery() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: u64 = 2_000;
        const CAPACITY: usize = 64;

        let avail = Arc::new(Availability::new(CAPACITY));
        let sub = Arc::new(McSubscriber::new(avail.clone() as Arc<dyn Gate>));
        let publisher = Arc::new(MpPublisher::new(
            avail.clone(),
            sub.clone() as Arc<dyn Gate>,
            CAPACITY,
        ));
        let ring = Arc::new(RingBuffer::<u64>::new(CAPACITY));

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let publisher = Arc::clone(&publisher);
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let value = (p as u64) * PER_PRODUCER + i;
                    loop {
                        let c = publisher.next();
                        if c == cursor::NONE {
                            std::hint::spin_loop();
                            continue;
                        }
                        *ring.slot(c).lock() = value;
                        publisher.done(c);
                        break;
                    }
                }
            }));
        }

        let total = PRODUCERS as u64 * PER_PRODUCER;
        let mut consumers = Vec::new();
        for _ in 0..CONSUMERS {
            let sub = Arc::clone(&sub);
            let ring = Arc::clone(&ring);
            consumers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    let c = sub.next();
                    if c == cursor::RETRY {
                        continue;
                    }
                    if c == cursor::NONE {
                        // Claim frontier tells us whether the stream is done.
                        if sub.claim.load() >= total as i64 - 1 {
                            break;
                        }
                        std::hint::spin_loop();
                        continue;
                    }
                    seen.push(*ring.slot(c).lock());
                    sub.done(c);
                }
                seen
            }));
        }

        for h in handles {
            h.join().expect("producer must not panic");
        }
        let mut all = HashSet::new();
        let mut count = 0_u64;
        for h in consumers {
            for v in h.join().expect("consumer must not panic") {
                assert!(all.insert(v), "value {v} delivered twice");
                count += 1;
            }
        }
        assert_eq!(count, total, "every value delivered exactly once");
    }

    #[test]
    fn test_chained_stages_release_in_order() {
        // publisher -> stage1 (MC) -> stage2 (SC) -> publisher
        let capacity = 4;
        let avail = Arc::new(Availability::new(capacity));
        let stage1 = Arc::new(McSubscriber::new(avail.clone() as Arc<dyn Gate>));
        let stage2 = Arc::new(ScSubscriber::new(stage1.clone() as Arc<dyn Gate>));
        let publisher = MpPublisher::new(avail.clone(), stage2.clone() as Arc<dyn Gate>, capacity);

        for _ in 0..capacity {
            let c = publisher.next();
            assert!(c >= 0);
            publisher.done(c);
        }
        assert_eq!(publisher.next(), cursor::NONE);

        // Stage 2 cannot pass stage 1.
        assert_eq!(stage2.next(), cursor::NONE);

        // Stage 1 releasing cursor 0 lets stage 2 claim it, and only the
        // tail stage's release opens publisher room.
        assert_eq!(stage1.next(), 0);
        stage1.done(0);
        assert_eq!(publisher.next(), cursor::NONE, "tail stage still holds 0");
        assert_eq!(stage2.next(), 0);
        stage2.done(0);
        assert_eq!(publisher.next(), 4);
    }

    #[test]
    fn test_sc_repositioning() {
        let avail = Arc::new(Availability::new(8));
        let sub = ScSubscriber::new(avail.clone() as Arc<dyn Gate>);
        for c in 0..6 {
            avail.publish(c);
        }
        sub.set_position(3);
        assert_eq!(sub.next(), 4, "repositioned past already-published work");
    }
}
