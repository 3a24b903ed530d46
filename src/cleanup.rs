//! Cleanup (C8): releases a frame sequence's resources once it's been
//! fully reduced and its collector has closed. Idempotent — `clear()` on a
//! sequence that's already clear is a harmless no-op — so a cleanup task
//! that somehow gets processed twice (it shouldn't, but nothing about the
//! bus prevents it if a caller publishes duplicates) can't corrupt state.

use crate::bus::Bus;
use crate::insights;
use crate::metrics::METRICS;
use crate::sequence::Take;

/// Claim and process exactly one cleanup task from `shard_index`, if one is
/// ready. Returns whether work was done.
pub fn consume_one(bus: &Bus, shard_index: usize) -> bool {
    let shard = bus.shard(shard_index);

    match shard.try_claim_cleanup_task() {
        Take::Ready(cursor) => {
            // Safety: read-only access to a cursor this call just claimed;
            // cleanup tasks are single-stage, no other reader follows.
            let sequence = unsafe { &shard.cleanup_task(cursor).sequence };
            sequence.clear();
            insights::record_cleanup(sequence.id());
            METRICS.record_cleanup();
            shard.complete_cleanup_task(cursor);
            true
        }
        Take::Empty => false,
        Take::Collision => false,
    }
}
