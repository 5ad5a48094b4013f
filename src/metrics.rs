use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing the statistics pipeline's own activity
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    recorded: AtomicU64,
    rotations: AtomicU64,
    dropped_intervals: AtomicU64,
    summaries_emitted: AtomicU64,
    sink_errors: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub recorded: u64,
    pub rotations: u64,
    pub dropped_intervals: u64,
    pub summaries_emitted: u64,
    pub sink_errors: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.dropped_intervals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emit(&self) {
        self.summaries_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            recorded: self.recorded.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            dropped_intervals: self.dropped_intervals.load(Ordering::Relaxed),
            summaries_emitted: self.summaries_emitted.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}
