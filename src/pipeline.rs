// src/pipeline.rs
//! Windowed alarm statistics.
//!
//! Producers call [`StatisticsPipeline::record`] for every alarm state change.
//! An external timer calls [`StatisticsPipeline::rotate`] once per interval,
//! which swaps the live counters for an empty set and queues the finished
//! interval on a bounded channel. A dedicated aggregator thread drains the
//! channel, computes an [`IntervalSummary`](crate::IntervalSummary) and hands it
//! to the configured [`StatisticsSink`].
//!
//! `record` and `rotate` share one mutex that is only held to bump a counter
//! or swap the live map. When the aggregator falls behind and the queue is
//! full, `rotate` drops the interval it just closed and logs a warning; it
//! never waits for room.

use crate::config::StatisticsConfig;
use crate::error::{AlarmError, Result};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::sink::StatisticsSink;
use crate::statistics::{summarize, AlarmCounts, IntervalCounters, Snapshot};
use chrono::Utc;
use tracing::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

const AGGREGATOR_THREAD_NAME: &str = "alarm-stats-aggregator";

/// Lifecycle of a [`StatisticsPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Interval length 0: every operation is a no-op
    Disabled,
    /// Constructed, aggregator not started yet; intervals queue up
    Idle,
    /// Aggregator thread consuming snapshots
    Running,
    /// Shutdown requested, aggregator not yet exited
    ShuttingDown,
    /// Aggregator exited
    Stopped,
}

/// Result of a [`StatisticsPipeline::rotate`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The finished interval is waiting for aggregation
    Queued,
    /// The queue was full; the finished interval was discarded
    Dropped,
    /// Statistics disabled or pipeline shut down; nothing happened
    Skipped,
}

struct Live {
    counters: IntervalCounters,
    tx: Option<mpsc::Sender<Snapshot>>,
}

struct Shared {
    closed: AtomicBool,
    state: Mutex<PipelineState>,
    metrics: PipelineMetrics,
}

/// Records alarm activity per interval and aggregates finished intervals in
/// the background
pub struct StatisticsPipeline {
    config: StatisticsConfig,
    live: Mutex<Live>,
    rx: Mutex<Option<mpsc::Receiver<Snapshot>>>,
    sink: Arc<dyn StatisticsSink>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StatisticsPipeline {
    /// Build a pipeline; the aggregator starts with [`start`](Self::start).
    ///
    /// An interval length of 0 yields a disabled pipeline that never starts a
    /// thread.
    pub fn new(config: StatisticsConfig, sink: Arc<dyn StatisticsSink>) -> Result<Self> {
        config.validate()?;

        let (tx, rx, state) = if config.is_enabled() {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            (Some(tx), Some(rx), PipelineState::Idle)
        } else {
            info!("Alarm statistics disabled (interval length 0)");
            (None, None, PipelineState::Disabled)
        };

        Ok(Self {
            config,
            live: Mutex::new(Live {
                counters: IntervalCounters::new(),
                tx,
            }),
            rx: Mutex::new(rx),
            sink,
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                state: Mutex::new(state),
                metrics: PipelineMetrics::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Configured interval length
    pub fn interval(&self) -> Duration {
        self.config.interval()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Whether an aggregator thread has been spawned and not yet joined
    pub fn has_worker(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Count one activation (`active == true`) or termination of `id` in the
    /// current interval.
    pub fn record(&self, id: &str, active: bool) {
        if !self.config.is_enabled() || self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        self.live.lock().counters.update(id, active);
        self.shared.metrics.record_event();
    }

    /// Close the current interval and queue it for aggregation.
    ///
    /// The live counters are replaced whether or not the queue accepted the
    /// finished interval.
    pub fn rotate(&self) -> RotateOutcome {
        if !self.config.is_enabled() {
            return RotateOutcome::Skipped;
        }
        let mut guard = self.live.lock();
        let live = &mut *guard;
        if self.shared.closed.load(Ordering::Acquire) {
            return RotateOutcome::Skipped;
        }
        let tx = match live.tx.as_ref() {
            Some(tx) => tx,
            None => return RotateOutcome::Skipped,
        };

        let now = Utc::now();
        let finished = std::mem::replace(&mut live.counters, IntervalCounters::starting_at(now));
        self.shared.metrics.record_rotation();

        match tx.try_send(finished.seal(now)) {
            Ok(()) => RotateOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.shared.metrics.record_drop();
                warn!("Alarm statistics lost for this time interval: the queue is full");
                RotateOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Statistics queue closed, interval discarded");
                RotateOutcome::Skipped
            }
        }
    }

    /// Number of finished intervals waiting for the aggregator
    pub fn queued_snapshots(&self) -> usize {
        self.live
            .lock()
            .tx
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Counts of `id` in the interval in progress
    pub fn live_counts(&self, id: &str) -> Option<AlarmCounts> {
        self.live.lock().counters.get(id)
    }

    /// Spawn the aggregator thread. Does nothing when statistics are disabled.
    pub fn start(&self) -> Result<()> {
        if !self.config.is_enabled() {
            debug!("Statistics disabled, aggregator not started");
            return Ok(());
        }

        let mut state = self.shared.state.lock();
        if *state != PipelineState::Idle {
            return Err(AlarmError::InvalidState(format!(
                "cannot start statistics pipeline in state {:?}",
                *state
            )));
        }
        let rx = self.rx.lock().take().ok_or_else(|| {
            AlarmError::InvalidState("statistics queue receiver already taken".to_string())
        })?;

        let sink = self.sink.clone();
        let shared = self.shared.clone();
        let interval = self.config.interval();
        let top_n = self.config.top_n;
        let handle = thread::Builder::new()
            .name(AGGREGATOR_THREAD_NAME.to_string())
            .spawn(move || run_aggregator(rx, sink, shared, interval, top_n))?;

        *self.worker.lock() = Some(handle);
        *state = PipelineState::Running;
        info!(
            "Alarm statistics started: {} minute intervals, queue capacity {}",
            self.config.interval_length_minutes, self.config.queue_capacity
        );
        Ok(())
    }

    /// Stop accepting records and rotations and signal the aggregator to exit.
    ///
    /// Returns immediately; an interval being aggregated may or may not reach
    /// the sink. Use [`join`](Self::join) to wait for the thread.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            match *state {
                PipelineState::Disabled | PipelineState::ShuttingDown | PipelineState::Stopped => {
                    return
                }
                PipelineState::Idle => *state = PipelineState::Stopped,
                PipelineState::Running => *state = PipelineState::ShuttingDown,
            }
        }
        self.shared.closed.store(true, Ordering::Release);
        // Dropping the sender wakes an aggregator blocked on an empty queue
        self.live.lock().tx = None;
        self.rx.lock().take();
        info!("Alarm statistics shutdown requested");
    }

    /// Wait for the aggregator thread to exit.
    pub fn join(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| {
                AlarmError::InvalidState("statistics aggregator panicked".to_string())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for StatisticsPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_aggregator(
    mut rx: mpsc::Receiver<Snapshot>,
    sink: Arc<dyn StatisticsSink>,
    shared: Arc<Shared>,
    interval: Duration,
    top_n: usize,
) {
    debug!("Statistics aggregator running");
    while let Some(snapshot) = rx.blocking_recv() {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        let summary = summarize(&snapshot, interval, top_n);
        match sink.emit(&summary) {
            Ok(()) => shared.metrics.record_emit(),
            Err(e) => {
                shared.metrics.record_sink_error();
                warn!("Failed to write alarm statistics: {}", e);
            }
        }
    }
    *shared.state.lock() = PipelineState::Stopped;
    debug!("Statistics aggregator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::statistics::IntervalSummary;
    use std::time::Instant;

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn pipeline(interval: u32, queue: usize) -> (StatisticsPipeline, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = StatisticsConfig {
            interval_length_minutes: interval,
            queue_capacity: queue,
            top_n: 5,
        };
        (StatisticsPipeline::new(config, sink.clone()).unwrap(), sink)
    }

    #[test]
    fn test_rotation_emits_one_summary() {
        let (pipeline, sink) = pipeline(1, 10);
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);

        for _ in 0..3 {
            pipeline.record("X", true);
        }
        for _ in 0..2 {
            pipeline.record("X", false);
        }
        assert_eq!(pipeline.rotate(), RotateOutcome::Queued);
        assert!(wait_until(|| sink.len() == 1));

        let summary: IntervalSummary = sink.summaries().remove(0);
        assert_eq!(summary.total_alarms, 1);
        assert_eq!(summary.total_activations, 3);
        assert_eq!(summary.total_terminations, 2);
        assert_eq!(summary.total_operations, 5);
        assert_eq!(pipeline.live_counts("X"), None);

        pipeline.shutdown();
        pipeline.join().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_full_queue_drops_newest_interval() {
        let (pipeline, sink) = pipeline(1, 2);

        pipeline.record("A", true);
        assert_eq!(pipeline.rotate(), RotateOutcome::Queued);
        pipeline.record("B", true);
        assert_eq!(pipeline.rotate(), RotateOutcome::Queued);
        pipeline.record("C", true);
        assert_eq!(pipeline.rotate(), RotateOutcome::Dropped);

        assert_eq!(pipeline.queued_snapshots(), 2);
        assert_eq!(pipeline.metrics().dropped_intervals, 1);
        assert_eq!(pipeline.metrics().rotations, 3);
        // The live counters were replaced even though the interval was lost
        assert_eq!(pipeline.live_counts("C"), None);

        pipeline.start().unwrap();
        assert!(wait_until(|| sink.len() == 2));
        let ids: Vec<String> = sink
            .summaries()
            .iter()
            .map(|s| s.top_by_activations[0].id.clone())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_disabled_pipeline_is_inert() {
        let (pipeline, sink) = pipeline(0, 10);
        assert_eq!(pipeline.state(), PipelineState::Disabled);

        pipeline.record("X", true);
        assert_eq!(pipeline.live_counts("X"), None);
        assert_eq!(pipeline.rotate(), RotateOutcome::Skipped);

        pipeline.start().unwrap();
        assert!(!pipeline.has_worker());
        assert_eq!(pipeline.state(), PipelineState::Disabled);
        assert_eq!(pipeline.metrics(), MetricsSnapshot::default());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_shutdown_stops_processing() {
        let (pipeline, sink) = pipeline(1, 4);
        pipeline.start().unwrap();
        pipeline.shutdown();
        assert!(matches!(
            pipeline.state(),
            PipelineState::ShuttingDown | PipelineState::Stopped
        ));
        pipeline.join().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.record("X", true);
        assert_eq!(pipeline.live_counts("X"), None);
        assert_eq!(pipeline.rotate(), RotateOutcome::Skipped);
        assert!(sink.is_empty());
        assert!(matches!(pipeline.start(), Err(AlarmError::InvalidState(_))));
    }

    #[test]
    fn test_start_twice_rejected() {
        let (pipeline, _sink) = pipeline(5, 4);
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(AlarmError::InvalidState(_))));
    }

    #[test]
    fn test_shutdown_before_start() {
        let (pipeline, _sink) = pipeline(5, 4);
        pipeline.shutdown();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(!pipeline.has_worker());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let sink = Arc::new(MemorySink::new());
        let config = StatisticsConfig {
            interval_length_minutes: 1,
            queue_capacity: 0,
            top_n: 5,
        };
        assert!(matches!(
            StatisticsPipeline::new(config, sink),
            Err(AlarmError::Config(_))
        ));
    }

    #[test]
    fn test_concurrent_records_are_all_counted() {
        let (pipeline, _sink) = pipeline(1, 4);
        let pipeline = Arc::new(pipeline);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        pipeline.record("X", i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(
            pipeline.live_counts("X"),
            Some(AlarmCounts {
                activations: 2000,
                terminations: 2000,
            })
        );
        assert_eq!(pipeline.metrics().recorded, 4000);
    }
}
