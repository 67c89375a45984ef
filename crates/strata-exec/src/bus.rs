//! Process-wide registry of the shared pipeline queues.
//!
//! Read-only after construction; no per-query state lives here. Each shard
//! owns one reduce ring whose stages are daisy-chained over the same
//! slots:
//!
//! ```text
//! MP publisher → MC reduce sub → collect fan-out → MC cleanup sub ─┐
//!       ▲                                                          │
//!       └──────────────── gates the publisher ─────────────────────┘
//! ```
//!
//! A task is therefore reduced, then observed by every attached collector,
//! then reclaimed in place, before its slot can be republished. One
//! process-wide dispatch ring carries dispatch kicks for all shards.

use std::sync::Arc;

use strata_error::Result;
use strata_ring::{Availability, FanOut, Gate, McSubscriber, MpPublisher, RingBuffer};

use crate::config::ExecConfig;
use crate::task::{DispatchTask, ReduceTask};

/// One shard's queues and sequences.
pub struct Shard {
    pub reduce_ring: RingBuffer<ReduceTask>,
    pub reduce_pub: MpPublisher,
    pub reduce_sub: Arc<McSubscriber>,
    pub collect_fan_out: Arc<FanOut>,
    pub cleanup_sub: Arc<McSubscriber>,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        let availability = Arc::new(Availability::new(capacity));
        let reduce_sub = Arc::new(McSubscriber::new(
            Arc::clone(&availability) as Arc<dyn Gate>
        ));
        let collect_fan_out = Arc::new(FanOut::new(Arc::clone(&reduce_sub) as Arc<dyn Gate>));
        let cleanup_sub = Arc::new(McSubscriber::new(
            Arc::clone(&collect_fan_out) as Arc<dyn Gate>
        ));
        let reduce_pub = MpPublisher::new(
            availability,
            Arc::clone(&cleanup_sub) as Arc<dyn Gate>,
            capacity,
        );
        Self {
            reduce_ring: RingBuffer::new(capacity),
            reduce_pub,
            reduce_sub,
            collect_fan_out,
            cleanup_sub,
        }
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("capacity", &self.reduce_ring.capacity())
            .field("collectors", &self.collect_fan_out.member_count())
            .finish()
    }
}

/// All shared queues of the pipeline.
pub struct MessageBus {
    shards: Vec<Shard>,
    pub dispatch_ring: RingBuffer<DispatchTask>,
    pub dispatch_pub: MpPublisher,
    pub dispatch_sub: Arc<McSubscriber>,
    config: ExecConfig,
}

impl MessageBus {
    /// Build the bus for a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails when the configuration fails validation.
    pub fn new(config: ExecConfig) -> Result<Arc<Self>> {
        let config = ExecConfig::try_new(
            config.shard_count,
            config.reduce_queue_capacity,
            config.dispatch_queue_capacity,
            config.worker_count,
        )?;
        let shards = (0..config.shard_count)
            .map(|_| Shard::new(config.reduce_queue_capacity))
            .collect();

        let dispatch_avail = Arc::new(Availability::new(config.dispatch_queue_capacity));
        let dispatch_sub = Arc::new(McSubscriber::new(
            Arc::clone(&dispatch_avail) as Arc<dyn Gate>
        ));
        let dispatch_pub = MpPublisher::new(
            dispatch_avail,
            Arc::clone(&dispatch_sub) as Arc<dyn Gate>,
            config.dispatch_queue_capacity,
        );

        Ok(Arc::new(Self {
            shards,
            dispatch_ring: RingBuffer::new(config.dispatch_queue_capacity),
            dispatch_pub,
            dispatch_sub,
            config,
        }))
    }

    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    #[must_use]
    pub fn shard(&self, index: usize) -> &Shard {
        &self.shards[index]
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("shards", &self.shards.len())
            .field("config", &self.config)
            .finish()
    }
}
