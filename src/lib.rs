//! pageflow — an asynchronous page-frame execution pipeline for columnar
//! scans.
//!
//! A scan over a table is decomposed into page-aligned row-range "frames".
//! Frames flow through three stages connected by bounded lock-free ring
//! queues: dispatch walks a query's page frames and hands each one to a
//! shard's reduce queue; a pool of reduce workers runs the query's
//! predicate/projection over each frame; collect cursors read reduced
//! frames back out in order and flatten them into a row-id stream for the
//! caller. Any thread can pick up dispatch or reduce work for any query —
//! there are no per-query worker threads.
//!
//! `Engine` is the front door: it owns the bus and a fixed worker pool, and
//! `Engine::submit` hands back a `CollectCursor` for one query.
//!
//! ```no_run
//! use pageflow::{Engine, PipelineConfig};
//!
//! let mut engine = Engine::start(PipelineConfig::default()).expect("valid config");
//! // engine.submit(&factory, reducer, None) to run a scan.
//! engine.shutdown();
//! ```
//!
//! The lower-level pieces (`Bus`, `FrameSequence`, `dispatch`, `reduce_job`,
//! `CollectCursor`) are independently public for callers that want to drive
//! the pipeline without the bundled worker pool — e.g. an embedding query
//! engine that already manages its own thread pool.
//!
//! ```no_run
//! use pageflow::{Bus, PipelineConfig};
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::default();
//! let bus = Arc::new(Bus::new(config).expect("valid config"));
//! ```

pub mod bus;
pub mod cleanup;
pub mod collect;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod frame_sequence;
pub mod insights;
pub mod interfaces;
pub mod metrics;
pub mod page_cache;
pub mod reduce_job;
pub mod ring;
pub mod rowid;
pub mod sequence;
pub mod tasks;

pub use bus::{Bus, ShardBus};
pub use collect::CollectCursor;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use context::ExecutionContext;
pub use engine::Engine;
pub use error::{PipelineError, Result};
pub use frame_sequence::FrameSequence;
pub use interfaces::{ColumnAddr, PageFrame, PageFrameCursor, RecordCursor, RecordCursorFactory, Reducer};
pub use reduce_job::ReduceJob;
pub use tasks::{CleanupTask, DispatchTask, ReduceTask};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn default_config_builds_a_bus() {
        let bus = Bus::new(PipelineConfig::default());
        assert!(bus.is_ok());
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn end_to_end_single_frame_scan() {
        struct OneRowCursor {
            served: bool,
        }
        impl PageFrameCursor for OneRowCursor {
            fn next(&mut self) -> Result<Option<PageFrame>> {
                if self.served {
                    return Ok(None);
                }
                self.served = true;
                Ok(Some(PageFrame {
                    partition_index: 0,
                    row_count: 5,
                    partition_row_lo: 0,
                    columns: vec![ColumnAddr { address: 0, len_bytes: 40 }],
                }))
            }
            fn to_top(&mut self) {
                self.served = false;
            }
            fn size(&self) -> i64 {
                1
            }
        }

        struct AlwaysTrueReducer;
        impl Reducer for AlwaysTrueReducer {
            fn reduce(&self, frame: &PageFrame, _ctx: &ExecutionContext, out: &mut Vec<u64>) -> Result<()> {
                for row in 0..frame.row_count {
                    out.push(crate::rowid::pack(frame.partition_index, row));
                }
                Ok(())
            }
        }

        let bus = Arc::new(Bus::new(PipelineConfig::default()).unwrap());
        let sequence = Arc::new(FrameSequence::new(
            1,
            0,
            1,
            Box::new(OneRowCursor { served: false }),
            Arc::new(AlwaysTrueReducer),
        ));
        let mut collect = CollectCursor::open(Arc::clone(&bus), sequence).unwrap();

        let mut rows = Vec::new();
        while collect.has_next().unwrap() {
            rows.push(collect.next_row_id().unwrap());
        }
        assert_eq!(rows.len(), 5);
    }
}
