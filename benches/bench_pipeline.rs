//! Single-shard dispatch + reduce + collect throughput, mirroring the
//! teacher's raw-ring-buffer throughput benchmarks but driven through the
//! page-frame pipeline's public `Engine` entry point.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use pageflow::{
    ColumnAddr, Engine, ExecutionContext, PageFrame, PageFrameCursor, PipelineConfig, RecordCursor,
    RecordCursorFactory, Reducer, Result,
};

const FRAME_COUNT: usize = 64;
const ROWS_PER_FRAME: u64 = 4_096;

struct BenchTable;

struct BenchCursor {
    position: usize,
}

impl PageFrameCursor for BenchCursor {
    fn next(&mut self) -> Result<Option<PageFrame>> {
        if self.position >= FRAME_COUNT {
            return Ok(None);
        }
        let frame = PageFrame {
            partition_index: self.position as u32,
            row_count: ROWS_PER_FRAME,
            partition_row_lo: 0,
            columns: vec![ColumnAddr { address: 0, len_bytes: 8 * ROWS_PER_FRAME as usize }],
        };
        self.position += 1;
        Ok(Some(frame))
    }

    fn to_top(&mut self) {
        self.position = 0;
    }

    fn size(&self) -> i64 {
        FRAME_COUNT as i64
    }
}

impl RecordCursorFactory for BenchTable {
    fn open_page_frame_cursor(&self, _ctx: &ExecutionContext) -> Result<Box<dyn PageFrameCursor>> {
        Ok(Box::new(BenchCursor { position: 0 }))
    }

    fn page_frame_count_hint(&self) -> Option<usize> {
        Some(FRAME_COUNT)
    }
}

/// Keeps roughly a quarter of each frame's rows, giving the reducer
/// realistic per-row branch work instead of a pure memcpy.
struct EveryFourthRowReducer;
impl Reducer for EveryFourthRowReducer {
    fn reduce(&self, frame: &PageFrame, _ctx: &ExecutionContext, out: &mut Vec<u64>) -> Result<()> {
        for row in 0..frame.row_count {
            if row % 4 == 0 {
                out.push(pageflow::rowid::pack(frame.partition_index, row));
            }
        }
        Ok(())
    }
}

fn run_one_scan(engine: &Engine) -> u64 {
    let table = BenchTable;
    let mut collect = engine
        .submit(&table, Arc::new(EveryFourthRowReducer), None)
        .expect("submit succeeds");
    let mut count = 0u64;
    while collect.has_next().expect("collect does not error") {
        black_box(collect.next_row_id());
        count += 1;
    }
    count
}

fn bench_single_shard_scan(c: &mut Criterion) {
    let config = PipelineConfig::builder()
        .shard_count(1)
        .worker_count(4)
        .reduce_queue_capacity(1024)
        .cleanup_queue_capacity(1024)
        .dispatch_queue_capacity(1024)
        .build()
        .expect("valid bench config");
    let mut engine = Engine::start(config).expect("engine starts");

    let mut group = c.benchmark_group("single_shard_scan");
    group.throughput(Throughput::Elements((FRAME_COUNT as u64) * ROWS_PER_FRAME / 4));
    group.sample_size(20);

    group.bench_function("dispatch_reduce_collect", |b| {
        b.iter(|| black_box(run_one_scan(&engine)))
    });

    group.finish();
    engine.shutdown();
}

fn bench_four_shard_scan(c: &mut Criterion) {
    let config = PipelineConfig::builder()
        .shard_count(4)
        .worker_count(8)
        .reduce_queue_capacity(1024)
        .cleanup_queue_capacity(1024)
        .dispatch_queue_capacity(1024)
        .build()
        .expect("valid bench config");
    let mut engine = Engine::start(config).expect("engine starts");

    let mut group = c.benchmark_group("four_shard_scan");
    group.throughput(Throughput::Elements((FRAME_COUNT as u64) * ROWS_PER_FRAME / 4));
    group.sample_size(20);

    group.bench_function("dispatch_reduce_collect", |b| {
        b.iter(|| black_box(run_one_scan(&engine)))
    });

    group.finish();
    engine.shutdown();
}

criterion_group!(benches, bench_single_shard_scan, bench_four_shard_scan);
criterion_main!(benches);
