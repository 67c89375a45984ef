//! Per-request execution context.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::bus::MessageBus;

/// What a query execution needs from its environment: the message bus, a
/// worker-count hint, and a random source (shard choice and sequence
/// identities).
pub struct ExecutionContext {
    bus: Arc<MessageBus>,
    worker_count: usize,
    rng: Mutex<SmallRng>,
}

impl ExecutionContext {
    /// A context with an entropy-seeded random source.
    #[must_use]
    pub fn new(bus: Arc<MessageBus>, worker_count: usize) -> Self {
        Self::with_seed(bus, worker_count, rand::random::<u64>())
    }

    /// A context with a deterministic random source (tests).
    #[must_use]
    pub fn with_seed(bus: Arc<MessageBus>, worker_count: usize, seed: u64) -> Self {
        Self {
            bus,
            worker_count,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    #[inline]
    #[must_use]
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Uniformly random shard for a query's lifetime.
    #[must_use]
    pub fn random_shard(&self) -> usize {
        self.rng.lock().random_range(0..self.bus.shard_count())
    }

    /// A fresh 64-bit sequence identity.
    #[must_use]
    pub fn next_sequence_id(&self) -> u64 {
        self.rng.lock().random::<u64>()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("worker_count", &self.worker_count)
            .finish_non_exhaustive()
    }
}
