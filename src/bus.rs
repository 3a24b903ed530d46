//! Message bus (C2): the process-wide dispatch queue plus, per shard, a
//! reduce queue, its collect fan-out, and a cleanup queue. Every queue here
//! is a single ring carrying one or two read stages rather than a pop-and-
//! discard channel — see the module-level notes on `reduce_ring` below for
//! why.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fanout::FanOut;
use crate::insights;
use crate::metrics::METRICS;
use crate::ring::{McSubscriber, MpPublisher, RingQueue};
use crate::sequence::{Claim, Sequence, Take};
use crate::tasks::{CleanupTask, DispatchTask, ReduceTask};

/// One shard's slice of the bus. A reduce task published here passes
/// through two read stages over the *same* ring slot: first a reduce
/// worker claims it via `reduce_sub`, fills in `row_ids` in place, and
/// marks it done; then every attached query's collector reads the same
/// slot once `collect_fanout`'s gate says it's ready, and the slot isn't
/// eligible for reuse by the producer until every collector has passed it.
pub struct ShardBus {
    index: usize,
    reduce_ring: RingQueue<ReduceTask>,
    reduce_pub: MpPublisher,
    reduce_sub: McSubscriber,
    collect_fanout: FanOut,
    cleanup_ring: RingQueue<CleanupTask>,
    cleanup_pub: MpPublisher,
    cleanup_sub: McSubscriber,
}

impl ShardBus {
    fn new(index: usize, reduce_capacity: usize, cleanup_capacity: usize) -> Result<Self> {
        Ok(Self {
            index,
            reduce_ring: RingQueue::new(reduce_capacity)?,
            reduce_pub: MpPublisher::new(reduce_capacity)?,
            reduce_sub: McSubscriber::new(reduce_capacity)?,
            collect_fanout: FanOut::new(),
            cleanup_ring: RingQueue::new(cleanup_capacity)?,
            cleanup_pub: MpPublisher::new(cleanup_capacity)?,
            cleanup_sub: McSubscriber::new(cleanup_capacity)?,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Attach a query's collect cursor to this shard's fan-out barrier.
    pub fn attach_collector(&self, handle: Arc<Sequence>) {
        self.collect_fanout.attach(handle);
    }

    pub fn detach_collector(&self, handle: &Arc<Sequence>) {
        self.collect_fanout.detach(handle);
    }

    pub fn collect_fanout(&self) -> &FanOut {
        &self.collect_fanout
    }

    /// Publish a reduce task for `frame_index`, gated by the collect
    /// fan-out so the slot can't be recycled while a query is still reading
    /// it. The slot's previous occupant's `row_ids` buffer, if any, is
    /// cleared and reused rather than dropped — the row list is a
    /// grow-on-write buffer owned by the slot, not the task.
    pub fn try_publish_reduce_task(&self, sequence: Arc<crate::frame_sequence::FrameSequence>, frame_index: usize) -> Claim {
        match self.reduce_pub.try_claim(&self.collect_fanout) {
            Claim::Ready(cursor) => {
                // Safety: this cursor was just claimed and published by no
                // one else yet — exclusive write window.
                unsafe {
                    let slot = self.reduce_ring.slot_mut(cursor);
                    let mut row_ids = slot.take().map(|prev| prev.row_ids).unwrap_or_default();
                    row_ids.clear();
                    *slot = Some(ReduceTask {
                        sequence,
                        frame_index,
                        row_ids,
                    });
                }
                self.reduce_pub.publish(cursor);
                Claim::Ready(cursor)
            }
            Claim::Full => {
                insights::record_backpressure(self.index);
                METRICS.record_backpressure();
                Claim::Full
            }
        }
    }

    pub fn try_claim_reduce_task(&self) -> Take {
        self.reduce_sub.try_next(self.reduce_pub.published_count())
    }

    /// # Safety
    /// Only valid for a cursor this caller just got back from
    /// `try_claim_reduce_task` as `Take::Ready`, and only before calling
    /// `complete_reduce_task` on it.
    pub unsafe fn reduce_task_mut(&self, cursor: u64) -> &mut ReduceTask {
        self.reduce_ring
            .slot_mut(cursor)
            .as_mut()
            .expect("claimed reduce slot is always populated")
    }

    pub fn complete_reduce_task(&self, cursor: u64) {
        self.reduce_sub.done(cursor);
    }

    pub fn reduced_count(&self) -> u64 {
        self.reduce_sub.completed()
    }

    /// # Safety
    /// Only valid for a cursor known (via `reduced_count`) to have been
    /// reduced; read-only, so many collectors may call this concurrently
    /// for the same cursor.
    pub unsafe fn reduce_task(&self, cursor: u64) -> &ReduceTask {
        self.reduce_ring
            .slot(cursor)
            .as_ref()
            .expect("reduced slot is always populated")
    }

    pub fn try_publish_cleanup_task(&self, task: CleanupTask) -> Claim {
        match self.cleanup_pub.try_claim(&self.cleanup_sub) {
            Claim::Ready(cursor) => {
                unsafe { *self.cleanup_ring.slot_mut(cursor) = Some(task) };
                self.cleanup_pub.publish(cursor);
                Claim::Ready(cursor)
            }
            Claim::Full => Claim::Full,
        }
    }

    pub fn try_claim_cleanup_task(&self) -> Take {
        self.cleanup_sub.try_next(self.cleanup_pub.published_count())
    }

    /// # Safety
    /// Only valid for a cursor this caller just got from
    /// `try_claim_cleanup_task`.
    pub unsafe fn cleanup_task(&self, cursor: u64) -> &CleanupTask {
        self.cleanup_ring
            .slot(cursor)
            .as_ref()
            .expect("claimed cleanup slot is always populated")
    }

    pub fn complete_cleanup_task(&self, cursor: u64) {
        self.cleanup_sub.done(cursor);
    }
}

/// The whole pipeline's shared state: one dispatch queue, N shard buses.
pub struct Bus {
    dispatch_ring: RingQueue<DispatchTask>,
    dispatch_pub: MpPublisher,
    dispatch_sub: McSubscriber,
    shards: Vec<ShardBus>,
    config: PipelineConfig,
}

impl Bus {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let shards = (0..config.shard_count())
            .map(|index| ShardBus::new(index, config.reduce_queue_capacity(), config.cleanup_queue_capacity()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dispatch_ring: RingQueue::new(config.dispatch_queue_capacity())?,
            dispatch_pub: MpPublisher::new(config.dispatch_queue_capacity())?,
            dispatch_sub: McSubscriber::new(config.dispatch_queue_capacity())?,
            shards,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard(&self, index: usize) -> &ShardBus {
        &self.shards[index]
    }

    pub fn try_publish_dispatch_task(&self, task: DispatchTask) -> Claim {
        match self.dispatch_pub.try_claim(&self.dispatch_sub) {
            Claim::Ready(cursor) => {
                unsafe { *self.dispatch_ring.slot_mut(cursor) = Some(task) };
                self.dispatch_pub.publish(cursor);
                Claim::Ready(cursor)
            }
            Claim::Full => Claim::Full,
        }
    }

    /// Pop the next dispatch task, if one is ready. Takes the task out of
    /// the ring entirely — dispatch tasks are single-stage, consumed once.
    pub fn try_take_dispatch_task(&self) -> Option<DispatchTask> {
        loop {
            match self.dispatch_sub.try_next(self.dispatch_pub.published_count()) {
                Take::Ready(cursor) => {
                    let task = unsafe { self.dispatch_ring.slot_mut(cursor) }
                        .take()
                        .expect("published dispatch slot always populated");
                    self.dispatch_sub.done(cursor);
                    return Some(task);
                }
                Take::Empty => return None,
                Take::Collision => continue,
            }
        }
    }
}
