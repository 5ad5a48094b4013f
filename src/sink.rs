// src/sink.rs
//! Destinations for interval summaries.

use crate::error::Result;
use crate::statistics::IntervalSummary;
use tracing::info;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives one [`IntervalSummary`] per completed interval, in emission order.
///
/// Called from the aggregator thread, never from producers.
pub trait StatisticsSink: Send + Sync {
    fn emit(&self, summary: &IntervalSummary) -> Result<()>;
}

/// Writes each summary to the log at info level
#[derive(Debug, Default)]
pub struct LogSink;

impl StatisticsSink for LogSink {
    fn emit(&self, summary: &IntervalSummary) -> Result<()> {
        let top = summary
            .top_by_operations
            .iter()
            .map(|r| format!("{}={}", r.id, r.operations))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "Alarm statistics {} - {}: {} alarms, {} activations, {} terminations, {:.3} ops/s, top [{}]",
            summary.started_at.format("%Y-%m-%dT%H:%M:%S"),
            summary.ended_at.format("%Y-%m-%dT%H:%M:%S"),
            summary.total_alarms,
            summary.total_activations,
            summary.total_terminations,
            summary.avg_operations_per_second,
            top
        );
        Ok(())
    }
}

/// Appends each summary as one JSON object per line
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) `path` for appending
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Writing alarm statistics to {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatisticsSink for JsonLinesSink {
    fn emit(&self, summary: &IntervalSummary) -> Result<()> {
        let line = serde_json::to_string(summary)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps every summary in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    summaries: Mutex<Vec<IntervalSummary>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the summaries received so far
    pub fn summaries(&self) -> Vec<IntervalSummary> {
        self.summaries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.summaries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.lock().is_empty()
    }
}

impl StatisticsSink for MemorySink {
    fn emit(&self, summary: &IntervalSummary) -> Result<()> {
        self.summaries.lock().push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{summarize, IntervalCounters};
    use chrono::Utc;
    use std::time::Duration;

    fn sample() -> IntervalSummary {
        let mut counters = IntervalCounters::new();
        counters.update("X", true);
        summarize(&counters.seal(Utc::now()), Duration::from_secs(60), 5)
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.emit(&sample()).unwrap();
        sink.emit(&sample()).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.summaries()[0].total_activations, 1);
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();
        sink.emit(&sample()).unwrap();
        sink.emit(&sample()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: IntervalSummary = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.total_alarms, 1);
        assert_eq!(parsed.top_by_activations[0].id, "X");
    }

    #[test]
    fn test_log_sink_never_fails() {
        assert!(LogSink.emit(&sample()).is_ok());
    }
}
