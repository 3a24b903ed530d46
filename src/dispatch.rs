//! Dispatch (C5): the rentable algorithm that walks a frame sequence's page
//! frames and publishes one reduce task per frame. "Rentable" means no
//! thread owns this loop — any thread can call `run` and either make
//! progress from wherever the last caller left off, or find the sequence
//! already being driven and return immediately.
//!
//! Dispatch keeps going even after a sequence is invalidated: cancellation
//! stops new *queries* from being admitted, but a sequence already being
//! dispatched drains to completion so every frame it handed out gets
//! reduced and collected (or explicitly cleaned up) rather than left half
//! wired into the bus.

use std::sync::Arc;

use crate::bus::Bus;
use crate::error::Result;
use crate::frame_sequence::FrameSequence;
use crate::insights;
use crate::metrics::METRICS;
use crate::sequence::Claim;
use crate::tasks::DispatchTask;

pub fn run(sequence: &Arc<FrameSequence>, bus: &Bus) -> Result<()> {
    if !sequence.try_acquire_dispatch() {
        // Someone else is already driving this sequence's dispatch loop.
        return Ok(());
    }

    let result = drive(sequence, bus);
    sequence.release_dispatch();
    result
}

fn drive(sequence: &Arc<FrameSequence>, bus: &Bus) -> Result<()> {
    let shard = bus.shard(sequence.shard());

    loop {
        let frame_index = sequence.dispatch_start_index();
        if frame_index >= sequence.frame_count() {
            return Ok(());
        }

        let frame = {
            let mut cursor = sequence.page_frame_cursor().lock().unwrap();
            cursor.next()?
        };
        let Some(frame) = frame else {
            // Cursor exhausted before frame_count was reached: nothing
            // more to dispatch, treat as done.
            return Ok(());
        };
        sequence.page_address_cache().set(frame_index, frame);

        match shard.try_publish_reduce_task(Arc::clone(sequence), frame_index) {
            Claim::Ready(_) => {
                sequence.set_dispatch_start_index(frame_index + 1);
                insights::record_dispatch(sequence.id(), frame_index + 1);
                METRICS.record_dispatch();
            }
            Claim::Full => {
                // Requeue ourselves as a dispatch task so some worker picks
                // this sequence back up once the shard drains.
                let _ = bus.try_publish_dispatch_task(DispatchTask {
                    sequence: Arc::clone(sequence),
                });
                return Ok(());
            }
        }
    }
}
