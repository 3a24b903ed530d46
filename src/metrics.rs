//! Metrics for the page-frame pipeline.
//!
//! Lightweight atomic counters for observability, not a substitute for the
//! `insights` tracing spans — this is the cheap always-on layer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global pipeline counters.
pub struct Metrics {
    pub frames_dispatched: AtomicU64,
    pub frames_reduced: AtomicU64,
    pub rows_collected: AtomicU64,
    pub sequences_cleaned_up: AtomicU64,
    pub backpressure_events: AtomicU64,
    pub collisions_observed: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            frames_dispatched: AtomicU64::new(0),
            frames_reduced: AtomicU64::new(0),
            rows_collected: AtomicU64::new(0),
            sequences_cleaned_up: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
            collisions_observed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_dispatch(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reduce(&self) {
        self.frames_reduced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_collect(&self, rows: u64) {
        self.rows_collected.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cleanup(&self) {
        self.sequences_cleaned_up.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_collision(&self) {
        self.collisions_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            frames_reduced: self.frames_reduced.load(Ordering::Relaxed),
            rows_collected: self.rows_collected.load(Ordering::Relaxed),
            sequences_cleaned_up: self.sequences_cleaned_up.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
            collisions_observed: self.collisions_observed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.frames_dispatched.store(0, Ordering::Relaxed);
        self.frames_reduced.store(0, Ordering::Relaxed);
        self.rows_collected.store(0, Ordering::Relaxed);
        self.sequences_cleaned_up.store(0, Ordering::Relaxed);
        self.backpressure_events.store(0, Ordering::Relaxed);
        self.collisions_observed.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub frames_dispatched: u64,
    pub frames_reduced: u64,
    pub rows_collected: u64,
    pub sequences_cleaned_up: u64,
    pub backpressure_events: u64,
    pub collisions_observed: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dispatched={} reduced={} collected={} cleaned_up={} backpressure={} collisions={}",
            self.frames_dispatched,
            self.frames_reduced,
            self.rows_collected,
            self.sequences_cleaned_up,
            self.backpressure_events,
            self.collisions_observed,
        )
    }
}

/// Global metrics instance, shared by every bus/shard in the process.
pub static METRICS: Metrics = Metrics::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let m = Metrics::new();
        m.record_dispatch();
        m.record_reduce();
        m.record_collect(5);
        m.record_backpressure();

        let s = m.snapshot();
        assert_eq!(s.frames_dispatched, 1);
        assert_eq!(s.frames_reduced, 1);
        assert_eq!(s.rows_collected, 5);
        assert_eq!(s.backpressure_events, 1);
    }
}
