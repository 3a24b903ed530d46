//! Pipeline-wide defaults.
//!
//! Every capacity here must stay a power of two; `PipelineConfig` enforces it
//! at construction rather than at use.

/// Default number of shards in the message bus.
pub const DEFAULT_SHARD_COUNT: usize = 4;

/// Default reduce-queue capacity, per shard.
pub const DEFAULT_REDUCE_QUEUE_CAPACITY: usize = 1024;

/// Default dispatch-queue capacity (process-wide, one queue).
pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 1024;

/// Default cleanup-queue capacity, per shard.
pub const DEFAULT_CLEANUP_QUEUE_CAPACITY: usize = 1024;

/// Default worker thread count for the reduce job pool: one per logical
/// core, falling back to 1 on a host `num_cpus` can't read.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// Bits of a row id given to the partition index; the remainder go to the
/// local row id. See `rowid` module and `DESIGN.md` for why this split.
pub const ROW_ID_PARTITION_BITS: u32 = 24;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_powers_of_two() {
        assert!(DEFAULT_REDUCE_QUEUE_CAPACITY.is_power_of_two());
        assert!(DEFAULT_DISPATCH_QUEUE_CAPACITY.is_power_of_two());
        assert!(DEFAULT_CLEANUP_QUEUE_CAPACITY.is_power_of_two());
    }
}
