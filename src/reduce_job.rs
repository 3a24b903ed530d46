//! Reduce job (C6): the worker-side loop that claims reduce tasks off a
//! shard's queue, runs the query's reducer over the resolved page frame,
//! and marks the frame sequence's progress. Workers visit shards in a
//! shuffled order each pass so N workers don't all pile onto shard 0.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::bus::Bus;
use crate::insights;
use crate::metrics::METRICS;
use crate::sequence::Take;

/// A contended reduce-queue claim is retried this many times before the
/// worker moves on to the next shard — bounded so one hot shard can't
/// starve the rest of a worker's pass.
const MAX_COLLISION_RETRIES: usize = 8;

/// Claim and reduce exactly one task from `shard_index`, if one is ready.
/// Returns whether work was done, so a caller's loop can tell "shard had
/// nothing" apart from "shard had work and we did it".
pub fn consume_one(bus: &Bus, shard_index: usize) -> bool {
    let shard = bus.shard(shard_index);
    let mut retries = 0;

    loop {
        match shard.try_claim_reduce_task() {
            Take::Ready(cursor) => {
                // Safety: this cursor was just claimed by this call and no
                // one else will touch it until `complete_reduce_task`.
                let task = unsafe { shard.reduce_task_mut(cursor) };
                let sequence = Arc::clone(&task.sequence);
                let frame_index = task.frame_index;

                // A sequence invalidated (LIMIT satisfied, upstream
                // cancellation, an earlier frame's reducer failing) before
                // this frame's turn skips the reducer entirely: the task's
                // row list stays empty, which the collect stage already
                // treats as nothing-to-emit for that frame.
                if sequence.is_valid() {
                    let frame = sequence
                        .page_address_cache()
                        .get(frame_index)
                        .expect("dispatch always resolves a frame before publishing its reduce task");
                    let ctx = crate::context::ExecutionContext::new(
                        bus.config().worker_count(),
                        bus.shard_count(),
                    );
                    let outcome = task.sequence.reducer().reduce(frame, &ctx, &mut task.row_ids);
                    let row_count = task.row_ids.len() as u64;

                    shard.complete_reduce_task(cursor);

                    match outcome {
                        Ok(()) => {
                            sequence.record_frame_reduced(frame_index, row_count);
                            insights::record_reduce(shard_index, frame_index);
                            METRICS.record_reduce();
                        }
                        Err(err) => {
                            sequence.fail(err);
                            // Still advance the reduce counter with zero rows so
                            // `await_done`/collect don't wait on a frame that will
                            // never complete.
                            sequence.record_frame_reduced(frame_index, 0);
                        }
                    }
                } else {
                    shard.complete_reduce_task(cursor);
                    sequence.record_frame_reduced(frame_index, 0);
                }
                return true;
            }
            Take::Collision => {
                METRICS.record_collision();
                retries += 1;
                if retries >= MAX_COLLISION_RETRIES {
                    return false;
                }
                std::hint::spin_loop();
            }
            Take::Empty => return false,
        }
    }
}

/// One worker's view of the shard list: a shuffled visiting order, rebuilt
/// every full pass so repeated starvation patterns don't persist.
pub struct ReduceJob {
    shard_order: Vec<usize>,
}

impl ReduceJob {
    pub fn new(shard_count: usize) -> Self {
        let mut shard_order: Vec<usize> = (0..shard_count).collect();
        shard_order.shuffle(&mut rand::thread_rng());
        Self { shard_order }
    }

    /// Run one pass over every shard, doing at most one task per shard.
    /// Returns whether any shard had work.
    pub fn run_pass(&mut self, bus: &Bus) -> bool {
        self.shard_order.shuffle(&mut rand::thread_rng());
        let mut did_work = false;
        for &shard_index in &self.shard_order {
            if consume_one(bus, shard_index) {
                did_work = true;
            }
        }
        did_work
    }
}
