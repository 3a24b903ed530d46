//! Insights - observability for the page-frame pipeline.
//!
//! Unified tracing, zero-cost when disabled.
//!
//! ```toml
//! pageflow = { version = "0.1", features = ["tracing"] }
//! ```
//! ```rust,ignore
//! pageflow::insights::init_tracing();
//! ```

/// Install a `tracing-subscriber` fmt layer driven by `RUST_LOG`. Call once
/// at process startup; a no-op when the `tracing` feature is disabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing() {}

/// Span around one `dispatch()` call for a frame sequence.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_dispatch(sequence_id: u64, frame_count: usize) {
    let _span = tracing::debug_span!("dispatch", sequence_id, frame_count).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_dispatch(_sequence_id: u64, _frame_count: usize) {}

/// Span around a single shard's reduce tick.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_reduce(shard: usize, frame_index: usize) {
    let _span = tracing::trace_span!("reduce", shard, frame_index).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_reduce(_shard: usize, _frame_index: usize) {}

/// Span for a terminal cleanup of a frame sequence.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_cleanup(sequence_id: u64) {
    let _span = tracing::debug_span!("cleanup", sequence_id).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_cleanup(_sequence_id: u64) {}

/// Warn-level span raised whenever a publisher observes `Full` and a
/// work-stealing retry is about to happen.
#[cfg(feature = "tracing")]
#[inline]
pub fn record_backpressure(shard: usize) {
    let _span = tracing::warn_span!("backpressure", shard).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_backpressure(_shard: usize) {}
