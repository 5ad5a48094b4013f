//! ANNUNCIATOR - alarm aggregation core
//!
//! Keeps the currently relevant alarms of a monitored system in a bounded,
//! order-tracking table and summarizes alarm activity per time interval
//! without slowing down the code that records it.
//!
//! # Components
//!
//! - [`AlarmTable`]: at most `max_alarms` records in insertion order, with
//!   reactivated alarms moved to the front, eviction, inactive sweeps and
//!   acknowledgment queries
//! - [`StatisticsPipeline`]: per-interval activation/termination counters
//!   rotated onto a bounded queue and aggregated on a background thread
//! - [`AlarmService`]: owns both and routes [`AlarmEvent`]s to them
//! - [`StatisticsSink`]: where [`IntervalSummary`] records go
//!
//! # Examples
//!
//! ```rust
//! use annunciator::{AlarmEvent, AlarmService, CoreConfig, LogSink};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::from_yaml("statistics:\n  interval_length_minutes: 1\n")?;
//! let service = AlarmService::new(config, Arc::new(LogSink))?;
//! service.start()?;
//!
//! service.ingest(AlarmEvent::activated("PS:TEMP:1", 2))?;
//! service.ingest(AlarmEvent::terminated("PS:TEMP:1", 2))?;
//!
//! // Normally driven by an interval timer
//! service.rotate();
//! service.shutdown();
//! # Ok::<(), annunciator::AlarmError>(())
//! ```

// ============================================================================
// CORE MODULES
// ============================================================================

/// Error type shared across the crate
pub mod error;

/// Alarm records, events and eviction selectors
pub mod alarm;

/// YAML configuration with validation
pub mod config;

/// Bounded, order-tracking alarm table
pub mod table;

// ============================================================================
// STATISTICS MODULES
// ============================================================================

/// Interval counters and summaries
pub mod statistics;

/// Background statistics pipeline
pub mod pipeline;

/// Statistics sinks
pub mod sink;

/// Pipeline activity counters
pub mod metrics;

/// Service object combining table and pipeline
pub mod service;

// ============================================================================
// PUBLIC RE-EXPORTS
// ============================================================================

pub use alarm::{AlarmEvent, AlarmKind, AlarmRecord, HIGHEST_PRIORITY};
pub use config::{CoreConfig, StatisticsConfig, TableConfig};
pub use error::{AlarmError, Result};
pub use metrics::MetricsSnapshot;
pub use pipeline::{PipelineState, RotateOutcome, StatisticsPipeline};
pub use service::{AlarmService, Ingested};
pub use sink::{JsonLinesSink, LogSink, MemorySink, StatisticsSink};
pub use statistics::{AlarmCounts, IntervalCounters, IntervalSummary, RankedAlarm, Snapshot};
pub use table::AlarmTable;

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber filtered by `RUST_LOG`, `annunciator=info`
/// when unset. Safe to call more than once.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("annunciator=info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    // Already initialized
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
        tracing::info!("annunciator {} logging ready", VERSION);
        assert!(tracing::dispatcher::has_been_set());
    }
}
