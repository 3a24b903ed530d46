//! Pipeline configuration: a builder validated at construction, rather
//! than a struct of public fields left to be misused.

use crate::constants::{
    default_worker_count, DEFAULT_CLEANUP_QUEUE_CAPACITY, DEFAULT_DISPATCH_QUEUE_CAPACITY,
    DEFAULT_REDUCE_QUEUE_CAPACITY, DEFAULT_SHARD_COUNT,
};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    shard_count: usize,
    reduce_queue_capacity: usize,
    dispatch_queue_capacity: usize,
    cleanup_queue_capacity: usize,
    worker_count: usize,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn reduce_queue_capacity(&self) -> usize {
        self.reduce_queue_capacity
    }

    pub fn dispatch_queue_capacity(&self) -> usize {
        self.dispatch_queue_capacity
    }

    pub fn cleanup_queue_capacity(&self) -> usize {
        self.cleanup_queue_capacity
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build().expect("defaults are always valid")
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    shard_count: usize,
    reduce_queue_capacity: usize,
    dispatch_queue_capacity: usize,
    cleanup_queue_capacity: usize,
    worker_count: usize,
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            reduce_queue_capacity: DEFAULT_REDUCE_QUEUE_CAPACITY,
            dispatch_queue_capacity: DEFAULT_DISPATCH_QUEUE_CAPACITY,
            cleanup_queue_capacity: DEFAULT_CLEANUP_QUEUE_CAPACITY,
            worker_count: default_worker_count(),
        }
    }
}

impl PipelineConfigBuilder {
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn reduce_queue_capacity(mut self, capacity: usize) -> Self {
        self.reduce_queue_capacity = capacity;
        self
    }

    pub fn dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_queue_capacity = capacity;
        self
    }

    pub fn cleanup_queue_capacity(mut self, capacity: usize) -> Self {
        self.cleanup_queue_capacity = capacity;
        self
    }

    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        if self.shard_count == 0 {
            return Err(PipelineError::config("shard_count must be at least 1"));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::config("worker_count must be at least 1"));
        }
        for (name, value) in [
            ("reduce_queue_capacity", self.reduce_queue_capacity),
            ("dispatch_queue_capacity", self.dispatch_queue_capacity),
            ("cleanup_queue_capacity", self.cleanup_queue_capacity),
        ] {
            if value < 64 || !value.is_power_of_two() {
                return Err(PipelineError::config(format!(
                    "{name} must be a power of two >= 64, got {value}"
                )));
            }
        }
        Ok(PipelineConfig {
            shard_count: self.shard_count,
            reduce_queue_capacity: self.reduce_queue_capacity,
            dispatch_queue_capacity: self.dispatch_queue_capacity,
            cleanup_queue_capacity: self.cleanup_queue_capacity,
            worker_count: self.worker_count,
        })
    }
}
