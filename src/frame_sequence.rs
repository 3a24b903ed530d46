//! Frame sequence (C4): one per in-flight query. Owns the query's identity,
//! its resume point in the dispatch algorithm, per-frame reduce progress,
//! and the page-address cache and cursor backing it. All state here is
//! shared across whichever threads happen to be dispatching, reducing, or
//! collecting this sequence at a given moment — there is no dedicated
//! owning thread.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar as PlCondvar, Mutex as PlMutex};

use crate::bus::Bus;
use crate::error::{PipelineError, Result};
use crate::interfaces::{PageFrameCursor, Reducer};
use crate::page_cache::PageAddressCache;
use crate::ring::ScSubscriber;

pub struct FrameSequence {
    id: u64,
    shard: usize,
    frame_count: usize,
    valid: AtomicBool,
    reduce_counter: AtomicUsize,
    dispatch_start_index: AtomicUsize,
    dispatching: AtomicBool,
    frame_row_counts: Box<[AtomicU64]>,
    page_address_cache: PageAddressCache,
    page_frame_cursor: Mutex<Box<dyn PageFrameCursor>>,
    reducer: Arc<dyn Reducer>,
    collect_sub: ScSubscriber,
    done_mutex: PlMutex<()>,
    done_condvar: PlCondvar,
    failure: OnceCell<PipelineError>,
}

impl FrameSequence {
    pub fn new(
        id: u64,
        shard: usize,
        frame_count: usize,
        cursor: Box<dyn PageFrameCursor>,
        reducer: Arc<dyn Reducer>,
    ) -> Self {
        Self {
            id,
            shard,
            frame_count,
            valid: AtomicBool::new(true),
            reduce_counter: AtomicUsize::new(0),
            dispatch_start_index: AtomicUsize::new(0),
            dispatching: AtomicBool::new(false),
            frame_row_counts: (0..frame_count).map(|_| AtomicU64::new(0)).collect(),
            page_address_cache: PageAddressCache::with_capacity(frame_count),
            page_frame_cursor: Mutex::new(cursor),
            reducer,
            collect_sub: ScSubscriber::new(),
            done_mutex: PlMutex::new(()),
            done_condvar: PlCondvar::new(),
            failure: OnceCell::new(),
        }
    }

    /// Record a reducer failure and invalidate the sequence. Only the
    /// first failure sticks; later ones are dropped rather than queued.
    pub fn fail(&self, err: PipelineError) {
        let _ = self.failure.set(err);
        self.invalidate();
    }

    pub fn failure(&self) -> Option<&PipelineError> {
        self.failure.get()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn reducer(&self) -> &Arc<dyn Reducer> {
        &self.reducer
    }

    pub fn page_address_cache(&self) -> &PageAddressCache {
        &self.page_address_cache
    }

    pub fn page_frame_cursor(&self) -> &Mutex<Box<dyn PageFrameCursor>> {
        &self.page_frame_cursor
    }

    pub fn collect_sub(&self) -> &ScSubscriber {
        &self.collect_sub
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Monotonic: once invalidated, a sequence never becomes valid again.
    /// Frames already in flight still finish — cancellation stops new work,
    /// it doesn't roll back work in progress.
    pub fn invalidate(&self) {
        let _ = self
            .valid
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed);
        let _guard = self.done_mutex.lock();
        self.done_condvar.notify_all();
    }

    pub fn dispatch_start_index(&self) -> usize {
        self.dispatch_start_index.load(Ordering::Acquire)
    }

    pub fn set_dispatch_start_index(&self, index: usize) {
        self.dispatch_start_index.store(index, Ordering::Release);
    }

    /// Claim the right to run the dispatch loop. Rentable: if another
    /// thread already holds it, this call just returns `false` rather than
    /// blocking — the holder will make progress on this caller's behalf.
    pub fn try_acquire_dispatch(&self) -> bool {
        self.dispatching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release_dispatch(&self) {
        self.dispatching.store(false, Ordering::Release);
    }

    /// Record that `frame_index` finished reducing with `row_count` rows.
    /// Called by exactly one reduce worker per frame index.
    pub fn record_frame_reduced(&self, frame_index: usize, row_count: u64) {
        self.frame_row_counts[frame_index].store(row_count, Ordering::Release);
        let completed = self.reduce_counter.fetch_add(1, Ordering::AcqRel) + 1;
        if completed == self.frame_count {
            let _guard = self.done_mutex.lock();
            self.done_condvar.notify_all();
        }
    }

    pub fn frame_row_count(&self, frame_index: usize) -> u64 {
        self.frame_row_counts[frame_index].load(Ordering::Acquire)
    }

    pub fn reduced_frame_count(&self) -> usize {
        self.reduce_counter.load(Ordering::Acquire)
    }

    pub fn is_fully_reduced(&self) -> bool {
        self.reduced_frame_count() == self.frame_count
    }

    /// Busy-help until every frame has been reduced, or the sequence is
    /// invalidated with no further progress available. Rather than parking
    /// and waiting on someone else to finish the work, this re-enters
    /// dispatch for `self` and claims one reduce and one cleanup task on
    /// this sequence's shard each pass, falling back to a short condvar wait
    /// only when a pass makes no progress. Called by `CollectCursor::close`
    /// so a caller that closes early (`LIMIT`, a dropped cursor) still
    /// drives the sequence to quiescence instead of leaving it half-drained.
    pub fn await_done(self: &Arc<Self>, bus: &Bus) {
        loop {
            if self.is_fully_reduced() || !self.is_valid() {
                return;
            }
            let _ = self.dispatch(bus);
            crate::reduce_job::consume_one(bus, self.shard());
            crate::cleanup::consume_one(bus, self.shard());
            if self.is_fully_reduced() || !self.is_valid() {
                return;
            }
            let mut guard = self.done_mutex.lock();
            if !self.is_fully_reduced() && self.is_valid() {
                self.done_condvar.wait_for(&mut guard, Duration::from_micros(50));
            }
        }
    }

    /// Rewind for a second pass over the same frames (e.g. a query re-run
    /// after `LIMIT` short-circuited the first one).
    pub fn to_top(&self) {
        self.dispatch_start_index.store(0, Ordering::Release);
        self.reduce_counter.store(0, Ordering::Release);
        self.collect_sub.reset();
        self.page_frame_cursor.lock().unwrap().to_top();
        for count in self.frame_row_counts.iter() {
            count.store(0, Ordering::Relaxed);
        }
    }

    /// Release this sequence's resources for reuse. Only the cleanup stage
    /// calls this, and only once every frame has been both reduced and
    /// collected.
    pub fn clear(&self) {
        self.page_frame_cursor.lock().unwrap().to_top();
        for count in self.frame_row_counts.iter() {
            count.store(0, Ordering::Relaxed);
        }
    }

    /// Entry point for the dispatch algorithm (C5); thin wrapper so callers
    /// can drive a sequence without importing the `dispatch` module
    /// directly.
    pub fn dispatch(self: &Arc<Self>, bus: &Bus) -> Result<()> {
        crate::dispatch::run(self, bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::interfaces::PageFrame;
    use std::thread;

    fn test_bus() -> Bus {
        let config = PipelineConfig::builder()
            .shard_count(1)
            .reduce_queue_capacity(64)
            .cleanup_queue_capacity(64)
            .dispatch_queue_capacity(64)
            .build()
            .unwrap();
        Bus::new(config).unwrap()
    }

    struct EmptyCursor;
    impl PageFrameCursor for EmptyCursor {
        fn next(&mut self) -> Result<Option<PageFrame>> {
            Ok(None)
        }
        fn to_top(&mut self) {}
        fn size(&self) -> i64 {
            0
        }
    }

    struct NoopReducer;
    impl Reducer for NoopReducer {
        fn reduce(&self, _frame: &PageFrame, _ctx: &crate::context::ExecutionContext, _out: &mut Vec<u64>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn await_done_returns_immediately_once_every_frame_is_reduced() {
        let bus = test_bus();
        let sequence = Arc::new(FrameSequence::new(1, 0, 2, Box::new(EmptyCursor), Arc::new(NoopReducer)));
        sequence.record_frame_reduced(0, 0);
        sequence.record_frame_reduced(1, 0);
        sequence.await_done(&bus);
        assert!(sequence.is_fully_reduced());
    }

    #[test]
    fn await_done_wakes_on_invalidation_even_if_not_fully_reduced() {
        let bus = Arc::new(test_bus());
        // `frame_count` is 5 but the cursor never yields a frame, so dispatch
        // can never publish enough reduce tasks to reach `is_fully_reduced`;
        // only invalidation can end the busy-help loop.
        let sequence = Arc::new(FrameSequence::new(1, 0, 5, Box::new(EmptyCursor), Arc::new(NoopReducer)));
        let waiter = Arc::clone(&sequence);
        let waiter_bus = Arc::clone(&bus);
        let handle = thread::spawn(move || waiter.await_done(&waiter_bus));
        thread::sleep(std::time::Duration::from_millis(20));
        sequence.invalidate();
        handle.join().unwrap();
        assert!(!sequence.is_valid());
    }
}
