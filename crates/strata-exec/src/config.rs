//! Pipeline configuration.

use strata_error::{Result, StrataError};

/// Sizing of the shared queues and the worker pool.
///
/// Shard count and worker count are positive; queue capacities are powers
/// of two (ring addressing is `cursor & mask`). The reduce-queue capacity
/// bounds every stage of a shard; reduce, collect and cleanup sequences
/// all ride the same ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    pub shard_count: usize,
    pub reduce_queue_capacity: usize,
    pub dispatch_queue_capacity: usize,
    pub worker_count: usize,
}

impl ExecConfig {
    /// Validate a configuration.
    ///
    /// # Errors
    ///
    /// Fails when a count is zero or a capacity is not a power of two.
    pub fn try_new(
        shard_count: usize,
        reduce_queue_capacity: usize,
        dispatch_queue_capacity: usize,
        worker_count: usize,
    ) -> Result<Self> {
        if shard_count == 0 {
            return Err(StrataError::InvalidConfig {
                detail: "shard_count must be greater than zero",
            });
        }
        if worker_count == 0 {
            return Err(StrataError::InvalidConfig {
                detail: "worker_count must be greater than zero",
            });
        }
        if !reduce_queue_capacity.is_power_of_two() {
            return Err(StrataError::CapacityNotPowerOfTwo {
                what: "reduce_queue_capacity",
                value: reduce_queue_capacity,
            });
        }
        if !dispatch_queue_capacity.is_power_of_two() {
            return Err(StrataError::CapacityNotPowerOfTwo {
                what: "dispatch_queue_capacity",
                value: dispatch_queue_capacity,
            });
        }
        Ok(Self {
            shard_count,
            reduce_queue_capacity,
            dispatch_queue_capacity,
            worker_count,
        })
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map_or(2, std::num::NonZeroUsize::get)
            .saturating_sub(1)
            .max(1);
        Self {
            shard_count: 2,
            reduce_queue_capacity: 64,
            dispatch_queue_capacity: 32,
            worker_count: workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = ExecConfig::default();
        assert!(
            ExecConfig::try_new(
                c.shard_count,
                c.reduce_queue_capacity,
                c.dispatch_queue_capacity,
                c.worker_count
            )
            .is_ok()
        );
    }

    #[test]
    fn test_rejects_zero_counts() {
        assert!(ExecConfig::try_new(0, 64, 32, 1).is_err());
        assert!(ExecConfig::try_new(1, 64, 32, 0).is_err());
    }

    #[test]
    fn test_rejects_non_power_of_two_capacities() {
        let err = ExecConfig::try_new(1, 48, 32, 1).unwrap_err();
        assert!(matches!(
            err,
            StrataError::CapacityNotPowerOfTwo {
                what: "reduce_queue_capacity",
                ..
            }
        ));
        assert!(ExecConfig::try_new(1, 64, 33, 1).is_err());
    }
}
