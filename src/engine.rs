//! Engine: the front door that ties the bus, frame sequences, dispatch, and
//! a fixed pool of reduce worker threads together. Everything below this
//! module (bus, frame_sequence, dispatch, reduce_job, collect, cleanup) is
//! independently testable and usable standalone; `Engine` is the
//! batteries-included entry point a caller submits a scan through.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bus::Bus;
use crate::cleanup;
use crate::collect::CollectCursor;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::frame_sequence::FrameSequence;
use crate::interfaces::{PageFrame, PageFrameCursor, RecordCursorFactory, Reducer};
use crate::reduce_job::ReduceJob;

/// Bounded park between empty passes, for a worker that finds no claimable
/// work on any shard.
const WORKER_PARK: Duration = Duration::from_nanos(1);

/// A page-frame cursor that replays a fully-buffered frame list. `submit()`
/// drains the factory's real cursor exactly once to discover `frame_count`
/// and capture every frame's column addresses; dispatch then only ever
/// reads from this buffer, never touching the underlying reader again.
struct BufferedFrames {
    frames: Vec<PageFrame>,
    position: usize,
}

impl PageFrameCursor for BufferedFrames {
    fn next(&mut self) -> Result<Option<PageFrame>> {
        if self.position >= self.frames.len() {
            return Ok(None);
        }
        let frame = self.frames[self.position].clone();
        self.position += 1;
        Ok(Some(frame))
    }

    fn to_top(&mut self) {
        self.position = 0;
    }

    fn size(&self) -> i64 {
        self.frames.len() as i64
    }
}

/// Owns the message bus and a fixed pool of reduce worker threads, and
/// hands out `CollectCursor`s for queries submitted against a table's
/// `RecordCursorFactory`. One `Engine` per process is the expected
/// lifecycle; it outlives any individual query.
pub struct Engine {
    bus: Arc<Bus>,
    ctx: ExecutionContext,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    next_sequence_id: AtomicU64,
}

impl Engine {
    /// Build the bus and spin up `config.worker_count()` reduce workers.
    pub fn start(config: PipelineConfig) -> Result<Self> {
        let worker_count = config.worker_count();
        let shard_count = config.shard_count();
        let bus = Arc::new(Bus::new(config)?);
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..worker_count)
            .map(|_| spawn_worker(Arc::clone(&bus), Arc::clone(&shutdown)))
            .collect();

        Ok(Self {
            bus,
            ctx: ExecutionContext::new(worker_count, shard_count),
            shutdown,
            workers,
            next_sequence_id: AtomicU64::new(1),
        })
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Submit a scan: open the factory's page-frame cursor, walk it once to
    /// discover `frame_count` and buffer every frame's column addresses,
    /// bind a shard chosen uniformly at random, and hand back a row-id
    /// cursor over the surviving rows. `limit` implements SQL `LIMIT`;
    /// `None` means unbounded.
    pub fn submit(
        &self,
        factory: &dyn RecordCursorFactory,
        reducer: Arc<dyn Reducer>,
        limit: Option<u64>,
    ) -> Result<CollectCursor> {
        let mut cursor = factory.open_page_frame_cursor(&self.ctx)?;
        let mut frames = Vec::with_capacity(factory.page_frame_count_hint().unwrap_or(0));
        while let Some(frame) = cursor.next()? {
            frames.push(frame);
        }
        let frame_count = frames.len();

        let id = self.next_sequence_id.fetch_add(1, Ordering::Relaxed);
        let shard = self.ctx.random_shard();
        let sequence = Arc::new(FrameSequence::new(
            id,
            shard,
            frame_count,
            Box::new(BufferedFrames { frames, position: 0 }),
            reducer,
        ));

        CollectCursor::open_with_limit(Arc::clone(&self.bus), sequence, limit)
    }

    /// Signal every worker to stop after its current pass and join them.
    /// Idempotent — a second call finds an already-empty worker list.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(bus: Arc<Bus>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut job = ReduceJob::new(bus.shard_count());
        while !shutdown.load(Ordering::Acquire) {
            let dispatched = drain_dispatch(&bus);
            let reduced = job.run_pass(&bus);
            let cleaned = drain_cleanup(&bus);
            if !dispatched && !reduced && !cleaned {
                thread::sleep(WORKER_PARK);
            }
        }
    })
}

/// Pop and run one requeued dispatch task, if one is waiting. Without this,
/// a `DispatchTask` requeued after a `Claim::Full` bounce (`dispatch.rs`)
/// would only ever be drained by a foreground collector still polling its
/// own cursor — once that collector closes, nothing else in the process
/// would make further progress on the sequence.
fn drain_dispatch(bus: &Bus) -> bool {
    match bus.try_take_dispatch_task() {
        Some(task) => {
            let _ = task.sequence.dispatch(bus);
            true
        }
        None => false,
    }
}

fn drain_cleanup(bus: &Bus) -> bool {
    let mut did_work = false;
    for shard in 0..bus.shard_count() {
        if cleanup::consume_one(bus, shard) {
            did_work = true;
        }
    }
    did_work
}
