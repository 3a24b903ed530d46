//! Collect (C7): the per-query cursor that reads reduced frames back off a
//! shard's reduce queue in frame order and flattens them into a row-id
//! stream. One `CollectCursor` is created per query and attached to its
//! shard's fan-out barrier for its whole lifetime; `close()` detaches it.
//!
//! The underlying reduce queue is shared by every query hashed to the same
//! shard, so this cursor's own subscriber position walks every interleaved
//! slot up to the shard's globally-reduced frontier, silently skipping
//! frames that belong to other queries' frame sequences.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::bus::Bus;
use crate::error::Result;
use crate::frame_sequence::FrameSequence;
use crate::interfaces::RecordCursor;
use crate::metrics::METRICS;
use crate::sequence::Take;

pub struct CollectCursor {
    bus: Arc<Bus>,
    sequence: Arc<FrameSequence>,
    attached: bool,
    buffered_rows: VecDeque<u64>,
    current_frame_index: Option<usize>,
    limit: Option<u64>,
    emitted: u64,
}

impl CollectCursor {
    pub fn open(bus: Arc<Bus>, sequence: Arc<FrameSequence>) -> Result<Self> {
        Self::open_with_limit(bus, sequence, None)
    }

    /// Open a cursor bounded by `limit` rows (a SQL `LIMIT`). Once `limit`
    /// rows have been handed out, the sequence is invalidated so the rest
    /// of the pipeline fast-drains instead of reducing frames nobody will
    /// ever collect.
    pub fn open_with_limit(bus: Arc<Bus>, sequence: Arc<FrameSequence>, limit: Option<u64>) -> Result<Self> {
        bus.shard(sequence.shard())
            .attach_collector(sequence.collect_sub().gate_handle());
        sequence.dispatch(&bus)?;
        Ok(Self {
            bus,
            sequence,
            attached: true,
            buffered_rows: VecDeque::new(),
            current_frame_index: None,
            limit,
            emitted: 0,
        })
    }

    pub fn sequence(&self) -> &Arc<FrameSequence> {
        &self.sequence
    }

    /// Whether there's at least one more row to hand out, fetching and
    /// buffering the next matching frame if necessary.
    pub fn has_next(&mut self) -> Result<bool> {
        if let Some(limit) = self.limit {
            if self.emitted >= limit {
                self.sequence.invalidate();
                return Ok(false);
            }
        }
        // A run of consecutive zero-match frames (e.g. a predicate with no
        // matches at all) means this loop, not recursion — a recursive
        // retry here would grow the stack by one frame of depth per empty
        // frame in the run.
        loop {
            if !self.buffered_rows.is_empty() {
                return Ok(true);
            }
            match self.fetch_next_frame()? {
                Some((frame_index, row_ids)) => {
                    self.current_frame_index = Some(frame_index);
                    self.buffered_rows.extend(row_ids);
                }
                None => return Ok(false),
            }
        }
    }

    /// Pull the next frame belonging to this cursor's sequence out of the
    /// shared reduce queue, skipping (but still releasing) frames that
    /// belong to other queries. Returns `None` once every frame this
    /// sequence will ever produce has been consumed.
    fn fetch_next_frame(&mut self) -> Result<Option<(usize, Vec<u64>)>> {
        loop {
            let shard = self.bus.shard(self.sequence.shard());
            let reduced = shard.reduced_count();

            match self.sequence.collect_sub().try_next(reduced) {
                Take::Ready(cursor) => {
                    // Safety: `cursor` is < `reduced`, so the reduce stage
                    // has already completed it; read-only access is safe
                    // alongside any other collector reading the same slot.
                    let (frame_index, mine, row_ids) = unsafe {
                        let task = shard.reduce_task(cursor);
                        (
                            task.frame_index,
                            Arc::ptr_eq(&task.sequence, &self.sequence),
                            task.row_ids.clone(),
                        )
                    };
                    self.sequence.collect_sub().done(cursor);
                    if mine {
                        METRICS.record_collect(row_ids.len() as u64);
                        return Ok(Some((frame_index, row_ids)));
                    }
                    continue;
                }
                Take::Empty => {
                    if self.sequence.is_fully_reduced() {
                        return Ok(None);
                    }
                    // Help the pipeline along instead of spinning idle: pump
                    // one outstanding dispatch task and reduce one frame on
                    // our own shard, then check again.
                    if let Some(task) = self.bus.try_take_dispatch_task() {
                        task.sequence.dispatch(&self.bus)?;
                    }
                    crate::reduce_job::consume_one(&self.bus, self.sequence.shard());
                    std::thread::yield_now();
                }
                Take::Collision => unreachable!("collect subscriber is single-consumer"),
            }
        }
    }

    /// Rewind to the start of the result set for a second pass.
    pub fn to_top(&mut self) -> Result<()> {
        self.buffered_rows.clear();
        self.current_frame_index = None;
        self.emitted = 0;
        self.sequence.to_top();
        self.sequence.dispatch(&self.bus)
    }

    pub fn close(&mut self) {
        if self.attached {
            self.bus
                .shard(self.sequence.shard())
                .detach_collector(&self.sequence.collect_sub().gate_handle());
            self.attached = false;
            // Drive to quiescence even if the caller closed early (LIMIT,
            // a dropped cursor before exhaustion): busy-help dispatch/reduce
            // for this sequence until every frame has been reduced, rather
            // than only publishing cleanup for a sequence that already
            // happened to finish on its own.
            self.sequence.await_done(&self.bus);
            if self.sequence.is_fully_reduced() {
                let _ = self.bus.shard(self.sequence.shard()).try_publish_cleanup_task(
                    crate::tasks::CleanupTask {
                        sequence: Arc::clone(&self.sequence),
                    },
                );
            }
        }
    }
}

impl Drop for CollectCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl RecordCursor for CollectCursor {
    fn has_next(&mut self) -> bool {
        CollectCursor::has_next(self).unwrap_or(false)
    }

    fn next_row_id(&mut self) -> Option<u64> {
        let row_id = self.buffered_rows.pop_front()?;
        self.emitted += 1;
        Some(row_id)
    }

    fn record_at(&mut self, row_id: u64) {
        self.buffered_rows.push_front(row_id);
        self.emitted = self.emitted.saturating_sub(1);
    }

    fn to_top(&mut self) {
        let _ = CollectCursor::to_top(self);
    }

    fn size(&self) -> i64 {
        -1
    }

    fn close(&mut self) {
        CollectCursor::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::context::ExecutionContext;
    use crate::interfaces::{ColumnAddr, PageFrame, PageFrameCursor, Reducer};

    struct ThreeFrameCursor {
        position: usize,
    }
    impl PageFrameCursor for ThreeFrameCursor {
        fn next(&mut self) -> Result<Option<PageFrame>> {
            if self.position >= 3 {
                return Ok(None);
            }
            let frame = PageFrame {
                partition_index: self.position as u32,
                row_count: 2,
                partition_row_lo: 0,
                columns: vec![ColumnAddr { address: 0, len_bytes: 16 }],
            };
            self.position += 1;
            Ok(Some(frame))
        }
        fn to_top(&mut self) {
            self.position = 0;
        }
        fn size(&self) -> i64 {
            3
        }
    }

    struct AlwaysMatchReducer;
    impl Reducer for AlwaysMatchReducer {
        fn reduce(&self, frame: &PageFrame, _ctx: &ExecutionContext, out: &mut Vec<u64>) -> Result<()> {
            for row in 0..frame.row_count {
                out.push(crate::rowid::pack(frame.partition_index, row));
            }
            Ok(())
        }
    }

    fn test_bus() -> Arc<Bus> {
        let config = PipelineConfig::builder()
            .shard_count(1)
            .reduce_queue_capacity(64)
            .cleanup_queue_capacity(64)
            .dispatch_queue_capacity(64)
            .build()
            .unwrap();
        Arc::new(Bus::new(config).unwrap())
    }

    #[test]
    fn collects_every_row_across_all_frames() {
        let bus = test_bus();
        let cursor = Box::new(ThreeFrameCursor { position: 0 });
        let sequence = Arc::new(FrameSequence::new(1, 0, 3, cursor, Arc::new(AlwaysMatchReducer)));
        let mut collect = CollectCursor::open(Arc::clone(&bus), sequence).unwrap();

        let mut rows = Vec::new();
        while collect.has_next().unwrap() {
            rows.push(collect.next_row_id().unwrap());
        }
        assert_eq!(rows.len(), 6, "3 frames x 2 rows each");
    }

    #[test]
    fn to_top_allows_a_second_pass() {
        let bus = test_bus();
        let cursor = Box::new(ThreeFrameCursor { position: 0 });
        let sequence = Arc::new(FrameSequence::new(2, 0, 3, cursor, Arc::new(AlwaysMatchReducer)));
        let mut collect = CollectCursor::open(Arc::clone(&bus), sequence).unwrap();

        let mut first_pass = Vec::new();
        while collect.has_next().unwrap() {
            first_pass.push(collect.next_row_id().unwrap());
        }

        collect.to_top().unwrap();
        let mut second_pass = Vec::new();
        while collect.has_next().unwrap() {
            second_pass.push(collect.next_row_id().unwrap());
        }
        assert_eq!(first_pass, second_pass);
    }
}
