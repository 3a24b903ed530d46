//! Execution context: the per-query handle passed to a `Reducer` and to the
//! dispatch algorithm's shard-selection step. Deliberately thin — the
//! pipeline's shared state lives in the bus, not here.

use rand::Rng;

pub struct ExecutionContext {
    worker_count: usize,
    shard_count: usize,
}

impl ExecutionContext {
    pub fn new(worker_count: usize, shard_count: usize) -> Self {
        Self {
            worker_count,
            shard_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Uniform-random shard index, used to pick a starting point for
    /// work-stealing so concurrent queries on the same table don't all
    /// converge on shard 0.
    pub fn random_shard(&self) -> usize {
        rand::thread_rng().gen_range(0..self.shard_count)
    }
}
