//! The ring (C1): fixed-capacity slot storage plus the publisher/subscriber
//! pairs that claim and release positions in it.
//!
//! Slot storage uses `UnsafeCell<T>` per slot rather than raw
//! `ptr::write_volatile`/`read_volatile` — this queue's payloads (reduce
//! tasks, cleanup tasks) own heap data (`Vec<u64>` row lists) and aren't
//! `Copy`, so a volatile-pointer scheme doesn't apply. Exclusivity is
//! enforced by the claim/publish/complete protocol: a cursor is only ever
//! written by the thread that claimed it, and only read after that thread's
//! `publish`/`done` call has made the write visible to the reader (`Release`
//! paired with the reader's `Acquire` on the publisher/tracker cursor).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::sequence::{Claim, Gate, Sequence, Take};

/// Fixed-capacity slot storage, shared by the publisher and every
/// subscriber attached to a ring.
pub struct RingQueue<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
}

unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T> RingQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PipelineError::config(format!(
                "ring capacity must be a nonzero power of two, got {capacity}"
            )));
        }
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            slots,
            mask: capacity - 1,
        })
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// # Safety
    /// The caller must hold exclusive access to `cursor` — between a
    /// successful claim and the matching `publish`/`done` call on that same
    /// cursor, and never concurrently with another holder of the same slot.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, cursor: u64) -> &mut Option<T> {
        let index = cursor as usize & self.mask;
        &mut *self.slots[index].get()
    }

    /// # Safety
    /// The caller must only read a slot after observing (via `Acquire` on
    /// the owning cursor) that it has been published/completed, and must
    /// not race a concurrent `slot_mut` on the same cursor.
    pub unsafe fn slot(&self, cursor: u64) -> &Option<T> {
        let index = cursor as usize & self.mask;
        &*self.slots[index].get()
    }
}

/// Multi-producer publisher side of a ring: claims are CAS-raced, and
/// because writers finish in arbitrary order, "published" tracks the
/// highest *contiguous* prefix via a per-slot availability bitmap.
pub struct MpPublisher {
    claim_cursor: Sequence,
    available: Box<[AtomicU64]>,
    capacity: u64,
    mask: u64,
    index_shift: u32,
}

const WORD_BITS: u64 = 64;

impl MpPublisher {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < WORD_BITS as usize || !capacity.is_power_of_two() {
            return Err(PipelineError::config(format!(
                "MP publisher capacity must be a power of two >= {WORD_BITS}, got {capacity}"
            )));
        }
        let words = capacity as u64 / WORD_BITS;
        Ok(Self {
            claim_cursor: Sequence::new(0),
            available: (0..words).map(|_| AtomicU64::new(0)).collect(),
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            index_shift: capacity.trailing_zeros(),
        })
    }

    /// Attempt to claim the next cursor, gated so it never runs more than
    /// `capacity` ahead of `gate`'s position.
    pub fn try_claim(&self, gate: &dyn Gate) -> Claim {
        loop {
            let current = self.claim_cursor.get_relaxed();
            let next = current + 1;
            let gate_position = gate.position();
            let occupied = next.saturating_sub(gate_position);
            if occupied > self.capacity {
                return Claim::Full;
            }
            if self.claim_cursor.cas(current, next) {
                return Claim::Ready(current);
            }
            std::hint::spin_loop();
        }
    }

    fn word_and_bit(&self, cursor: u64) -> (usize, u32) {
        let index = cursor & self.mask;
        ((index / WORD_BITS) as usize, (index % WORD_BITS) as u32)
    }

    /// Mark `cursor` as published. Must be called exactly once per claimed
    /// cursor, after the slot's contents are fully written.
    pub fn publish(&self, cursor: u64) {
        let (word, bit) = self.word_and_bit(cursor);
        let flag = 1u64 << bit;
        self.available[word].fetch_or(flag, Ordering::Release);
    }

    /// Count of items published so far as a contiguous prefix from zero.
    /// Subscribers gate their own claims on this value.
    pub fn published_count(&self) -> u64 {
        let claimed = self.claim_cursor.get();
        let mut count = 0u64;
        while count < claimed {
            let (word, bit) = self.word_and_bit(count);
            let flag = 1u64 << bit;
            if self.available[word].load(Ordering::Acquire) & flag == 0 {
                break;
            }
            count += 1;
        }
        count
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    #[allow(dead_code)]
    fn index_shift(&self) -> u32 {
        self.index_shift
    }
}

/// Multi-consumer subscriber: claims are single-attempt CAS (`Collision` on
/// a race, rather than an internal spin) so a caller can interleave work
/// across shards instead of burning cycles on one contended shard.
/// Completion is tracked out of order via a per-slot bitmap, collapsing to
/// a monotonic `completed` cursor the same way the publisher collapses its
/// availability bitmap.
pub struct McSubscriber {
    claim_cursor: Sequence,
    completed_cursor: Sequence,
    slot_done: Box<[AtomicBool]>,
    mask: u64,
}

impl McSubscriber {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PipelineError::config(format!(
                "MC subscriber capacity must be a nonzero power of two, got {capacity}"
            )));
        }
        Ok(Self {
            claim_cursor: Sequence::new(0),
            completed_cursor: Sequence::new(0),
            slot_done: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
            mask: capacity as u64 - 1,
        })
    }

    /// Attempt once to claim the next unclaimed cursor below `published`.
    pub fn try_next(&self, published: u64) -> Take {
        let current = self.claim_cursor.get_relaxed();
        if current >= published {
            return Take::Empty;
        }
        if self.claim_cursor.cas(current, current + 1) {
            Take::Ready(current)
        } else {
            Take::Collision
        }
    }

    /// Mark `cursor` done. Safe to call out of order across worker threads.
    pub fn done(&self, cursor: u64) {
        let index = (cursor & self.mask) as usize;
        self.slot_done[index].store(true, Ordering::Release);
        self.try_advance_completed();
    }

    fn try_advance_completed(&self) {
        loop {
            let current = self.completed_cursor.get_relaxed();
            let index = (current & self.mask) as usize;
            if !self.slot_done[index].load(Ordering::Acquire) {
                return;
            }
            if !self.completed_cursor.cas(current, current + 1) {
                // another thread advanced it first; reload and keep trying
                continue;
            }
            self.slot_done[index].store(false, Ordering::Relaxed);
        }
    }

    /// Count of items this subscriber has fully completed — the gate
    /// downstream stages read against.
    pub fn completed(&self) -> u64 {
        self.completed_cursor.get()
    }
}

impl Gate for McSubscriber {
    fn position(&self) -> u64 {
        self.completed()
    }
}

/// Single-consumer subscriber: no contention on its own cursor, so claim
/// and release are plain loads/stores. Its cursor handle is cloneable so a
/// fan-out barrier can read it without the subscriber itself being shared.
pub struct ScSubscriber {
    cursor: Arc<Sequence>,
}

impl ScSubscriber {
    pub fn new() -> Self {
        Self {
            cursor: Arc::new(Sequence::new(0)),
        }
    }

    pub fn try_next(&self, published: u64) -> Take {
        let current = self.cursor.get_relaxed();
        if current >= published {
            Take::Empty
        } else {
            Take::Ready(current)
        }
    }

    pub fn done(&self, cursor: u64) {
        debug_assert_eq!(cursor, self.cursor.get_relaxed());
        self.cursor.set(cursor + 1);
    }

    pub fn position(&self) -> u64 {
        self.cursor.get()
    }

    /// Rewind to the start, as `to_top()` requires.
    pub fn reset(&self) {
        self.cursor.set(0);
    }

    /// Shared handle a fan-out barrier can hold without owning this subscriber.
    pub fn gate_handle(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }
}

impl Default for ScSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_rejects_non_power_of_two_capacity() {
        assert!(RingQueue::<u64>::new(0).is_err());
        assert!(RingQueue::<u64>::new(3).is_err());
        assert!(RingQueue::<u64>::new(64).is_ok());
    }

    #[test]
    fn mp_publisher_tracks_contiguous_published_prefix() {
        let pub_ = MpPublisher::new(64).unwrap();
        let unbounded = Sequence::new(u64::MAX / 2);
        let a = pub_.try_claim(&unbounded);
        let b = pub_.try_claim(&unbounded);
        assert_eq!(a, Claim::Ready(0));
        assert_eq!(b, Claim::Ready(1));
        assert_eq!(pub_.published_count(), 0);
        pub_.publish(1);
        assert_eq!(pub_.published_count(), 0, "cursor 0 still unpublished");
        pub_.publish(0);
        assert_eq!(pub_.published_count(), 2);
    }

    #[test]
    fn mp_publisher_reports_full_against_a_stalled_gate() {
        let pub_ = MpPublisher::new(64).unwrap();
        let stalled = Sequence::new(0);
        for i in 0..64 {
            assert_eq!(pub_.try_claim(&stalled), Claim::Ready(i));
        }
        assert_eq!(pub_.try_claim(&stalled), Claim::Full);
    }

    #[test]
    fn mc_subscriber_completes_out_of_order() {
        let sub = McSubscriber::new(64).unwrap();
        assert_eq!(sub.try_next(3), Take::Ready(0));
        assert_eq!(sub.try_next(3), Take::Ready(1));
        assert_eq!(sub.try_next(3), Take::Ready(2));
        assert_eq!(sub.try_next(3), Take::Empty);

        sub.done(1);
        assert_eq!(sub.completed(), 0, "0 hasn't completed yet");
        sub.done(0);
        assert_eq!(sub.completed(), 2, "0 and 1 collapse together");
        sub.done(2);
        assert_eq!(sub.completed(), 3);
    }

    #[test]
    fn sc_subscriber_is_sequential() {
        let sub = ScSubscriber::new();
        assert_eq!(sub.try_next(1), Take::Ready(0));
        sub.done(0);
        assert_eq!(sub.try_next(1), Take::Empty);
        sub.reset();
        assert_eq!(sub.try_next(1), Take::Ready(0));
    }
}
