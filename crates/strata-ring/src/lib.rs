//! Bounded ring queues with lock-free publisher/consumer sequences.
//!
//! This crate provides the queue discipline the StrataDB execution pipeline
//! is built on:
//!
//! - [`RingBuffer`]: a fixed, power-of-two array of slots addressed by
//!   `cursor & mask`, with per-slot guards so payloads can be mutated in
//!   place across producer/consumer handoffs.
//! - [`Availability`]: per-slot published-cursor cells that let subscribers
//!   observe out-of-order multi-producer publication.
//! - Publisher sequences ([`MpPublisher`], [`SpPublisher`]) and subscriber
//!   sequences ([`McSubscriber`], [`ScSubscriber`]) exchanging 64-bit
//!   monotonic cursors.
//! - [`FanOut`]: a publisher-side view of several subscribers whose
//!   effective position is the slowest member's.
//! - [`DoneLatch`]: the single-shot drained signal a frame sequence waits
//!   on.
//!
//! ## Protocol
//!
//! Sequences never block. `next()` either returns a claimable cursor,
//! [`cursor::NONE`] (ring full for publishers, nothing published for
//! subscribers), or [`cursor::RETRY`] (multi-consumer claim collision).
//! Spinning or parking on those outcomes is the caller's responsibility.
//! A slot is owned by whoever holds its cursor between `next()` and the
//! matching `done()`; slot mutexes are therefore uncontended and exist only
//! to keep the crate free of `unsafe`.

pub mod cache_aligned;
pub mod cursor;
pub mod fanout;
pub mod latch;
pub mod metrics;
pub mod ring;
pub mod seq;

pub use cache_aligned::{CACHE_LINE_BYTES, CacheAligned};
pub use cursor::SeqCounter;
pub use fanout::FanOut;
pub use latch::DoneLatch;
pub use metrics::{RingMetrics, reset_ring_metrics, ring_metrics};
pub use ring::{Availability, RingBuffer};
pub use seq::{Gate, McSubscriber, MpPublisher, ScSubscriber, SpPublisher};
