//! Payloads carried through the bus's three queues. Each is only ever
//! written by the thread that claimed its ring slot and read after that
//! slot's publish/complete has made the write visible — see `ring` module.

use std::sync::Arc;

use crate::frame_sequence::FrameSequence;

/// Published to the process-wide dispatch queue: "this frame sequence has
/// more frames to dispatch". The dispatch job re-derives everything else it
/// needs (shard, resume point) from the sequence itself.
pub struct DispatchTask {
    pub sequence: Arc<FrameSequence>,
}

/// Published to a shard's reduce queue by the dispatch stage, one per
/// frame. `row_ids` starts empty and is filled in place by the reducer so
/// the same allocation can be reused across frame sequences once collected
/// (see `clear()` on `FrameSequence`).
pub struct ReduceTask {
    pub sequence: Arc<FrameSequence>,
    pub frame_index: usize,
    pub row_ids: Vec<u64>,
}

/// Published to a shard's cleanup queue once a frame sequence's last frame
/// has been both reduced and collected.
pub struct CleanupTask {
    pub sequence: Arc<FrameSequence>,
}
