//! The OS worker-thread pool running reduce jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use strata_error::{Result, StrataError};

use crate::bus::MessageBus;
use crate::reduce::ReduceJob;

/// How many empty ticks a worker spins before parking.
const IDLE_SPINS_BEFORE_PARK: u32 = 64;

/// How long an idle worker parks between queue probes.
const IDLE_PARK: Duration = Duration::from_micros(100);

/// A fixed pool of named OS threads (`strata-worker-N`), each running its
/// own [`ReduceJob`] until halted.
///
/// Workers are an accelerator, not a requirement: the foreground's
/// work-stealing alone drives every query to completion, so the pool can
/// be halted (or never started) without wedging in-flight scans.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers with entropy-derived shard orders.
    ///
    /// # Errors
    ///
    /// Fails when the OS refuses a thread.
    pub fn start(bus: Arc<MessageBus>, worker_count: usize) -> Result<Self> {
        Self::start_with_seed(bus, worker_count, rand::random::<u64>())
    }

    /// Spawn with a deterministic seed (tests).
    ///
    /// # Errors
    ///
    /// Fails when the OS refuses a thread.
    pub fn start_with_seed(bus: Arc<MessageBus>, worker_count: usize, seed: u64) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let bus = Arc::clone(&bus);
            let shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("strata-worker-{worker_id}"))
                .spawn(move || {
                    tracing::info!(worker_id, "worker.start");
                    let job = ReduceJob::new(
                        bus,
                        worker_id,
                        seed.wrapping_add(worker_id as u64),
                        Arc::clone(&shutdown),
                    );
                    let mut idle_ticks = 0_u32;
                    while !shutdown.load(Ordering::Acquire) {
                        if job.run_once() {
                            idle_ticks = 0;
                            continue;
                        }
                        idle_ticks += 1;
                        if idle_ticks < IDLE_SPINS_BEFORE_PARK {
                            std::hint::spin_loop();
                        } else {
                            std::thread::park_timeout(IDLE_PARK);
                        }
                    }
                    tracing::info!(worker_id, "worker.stop");
                })
                .map_err(|e| StrataError::WorkerSpawn {
                    detail: e.to_string(),
                })?;
            handles.push(handle);
        }
        Ok(Self { handles, shutdown })
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop and join every worker. Idempotent.
    pub fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.halt();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .field("halted", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}
