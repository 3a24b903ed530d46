//! Fan-out barrier (C1): the collect stage attaches one subscriber cursor
//! per active query to a shard, and the reduce-queue publisher gates its
//! claims on the *slowest* of them — a slot can't be reused until every
//! query currently reading that shard has passed over it.
//!
//! Membership changes on every query open/close, so it has to support
//! lock-free attach/detach without blocking the publisher or any other
//! collector mid-read. The snapshot is an immutable `Vec` behind an
//! atomically-swapped pointer; old snapshots are reclaimed through
//! `crossbeam_epoch` rather than leaked or freed while a reader might still
//! hold a reference to them.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::epoch::{self, Atomic, Owned, Shared};

use crate::sequence::{Gate, Sequence};

pub struct FanOut {
    snapshot: Atomic<Vec<Arc<Sequence>>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            snapshot: Atomic::new(Vec::new()),
        }
    }

    /// Attach a new subscriber cursor. Returns a token `detach` needs back.
    pub fn attach(&self, member: Arc<Sequence>) {
        let guard = epoch::pin();
        loop {
            let current = self.snapshot.load(Ordering::Acquire, &guard);
            let current_ref = unsafe { current.as_ref() }.expect("snapshot never null");
            let mut next: Vec<Arc<Sequence>> = current_ref.clone();
            next.push(Arc::clone(&member));
            let new = Owned::new(next);
            match self
                .snapshot
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire, &guard)
            {
                Ok(_) => {
                    if !current.is_null() {
                        unsafe { guard.defer_destroy(current) };
                    }
                    return;
                }
                Err(_) => continue,
            }
        }
    }

    /// Detach a subscriber by pointer identity. No-op if already detached.
    pub fn detach(&self, member: &Arc<Sequence>) {
        let guard = epoch::pin();
        loop {
            let current = self.snapshot.load(Ordering::Acquire, &guard);
            let current_ref = unsafe { current.as_ref() }.expect("snapshot never null");
            if !current_ref.iter().any(|m| Arc::ptr_eq(m, member)) {
                return;
            }
            let next: Vec<Arc<Sequence>> = current_ref
                .iter()
                .filter(|m| !Arc::ptr_eq(m, member))
                .cloned()
                .collect();
            let new = Owned::new(next);
            match self
                .snapshot
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire, &guard)
            {
                Ok(_) => {
                    unsafe { guard.defer_destroy(current) };
                    return;
                }
                Err(_) => continue,
            }
        }
    }

    pub fn member_count(&self) -> usize {
        let guard = epoch::pin();
        let current: Shared<'_, Vec<Arc<Sequence>>> = self.snapshot.load(Ordering::Acquire, &guard);
        unsafe { current.as_ref() }.map_or(0, Vec::len)
    }

    /// Minimum position across all attached members, or `u64::MAX` when
    /// empty — an empty fan-out exerts no backpressure on the publisher.
    pub fn min_position(&self) -> u64 {
        let guard = epoch::pin();
        let current = self.snapshot.load(Ordering::Acquire, &guard);
        let members = unsafe { current.as_ref() }.expect("snapshot never null");
        members.iter().map(|m| m.get()).min().unwrap_or(u64::MAX)
    }
}

impl Gate for FanOut {
    fn position(&self) -> u64 {
        self.min_position()
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FanOut {
    fn drop(&mut self) {
        let guard = epoch::pin();
        let current = self.snapshot.swap(Shared::null(), Ordering::AcqRel, &guard);
        if !current.is_null() {
            unsafe { guard.defer_destroy(current) };
        }
    }
}
