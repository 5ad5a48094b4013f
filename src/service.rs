// src/service.rs
//! Host-facing entry point tying the alarm table and the statistics pipeline
//! together.

use crate::alarm::{AlarmEvent, AlarmKind, AlarmRecord};
use crate::config::CoreConfig;
use crate::error::{AlarmError, Result};
use crate::pipeline::{RotateOutcome, StatisticsPipeline};
use crate::sink::StatisticsSink;
use crate::table::AlarmTable;
use tracing::{debug, info};
use std::sync::Arc;

/// What [`AlarmService::ingest`] did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// New alarm added to the table. On a full table, `swept` counts the
    /// inactive alarms removed first and `evicted` names the alarm taken by
    /// [`AlarmTable::remove_oldest`] when the sweep freed nothing.
    Inserted { swept: usize, evicted: Option<String> },
    /// Existing alarm updated in place
    Updated,
    /// Termination of an alarm the table does not hold
    Ignored,
}

/// Owns one [`AlarmTable`] and one [`StatisticsPipeline`] and routes alarm
/// events to both.
///
/// # Examples
///
/// ```rust
/// use annunciator::{AlarmEvent, AlarmService, CoreConfig, MemorySink};
/// use std::sync::Arc;
///
/// let service = AlarmService::new(CoreConfig::default(), Arc::new(MemorySink::new()))?;
/// service.ingest(AlarmEvent::activated("PS:TEMP:1", 1))?;
/// assert_eq!(service.table().highest_priority_unacknowledged(), Some(1));
/// # Ok::<(), annunciator::AlarmError>(())
/// ```
pub struct AlarmService {
    table: AlarmTable,
    pipeline: StatisticsPipeline,
}

impl AlarmService {
    /// Validate `config` and build the table and the pipeline.
    pub fn new(config: CoreConfig, sink: Arc<dyn StatisticsSink>) -> Result<Self> {
        config.validate()?;
        let table = AlarmTable::new(config.table.max_alarms)?;
        let pipeline = StatisticsPipeline::new(config.statistics, sink)?;
        info!(
            "Alarm service created: capacity {}, statistics {}",
            table.capacity(),
            if pipeline.is_enabled() { "enabled" } else { "disabled" }
        );
        Ok(Self { table, pipeline })
    }

    pub fn table(&self) -> &AlarmTable {
        &self.table
    }

    pub fn pipeline(&self) -> &StatisticsPipeline {
        &self.pipeline
    }

    /// Start the statistics aggregator
    pub fn start(&self) -> Result<()> {
        self.pipeline.start()
    }

    /// Stop the statistics aggregator without waiting for it
    pub fn shutdown(&self) {
        self.pipeline.shutdown();
    }

    /// Close the current statistics interval
    pub fn rotate(&self) -> RotateOutcome {
        self.pipeline.rotate()
    }

    /// Apply one alarm event.
    ///
    /// Known alarms are updated in place through [`AlarmTable::apply`], so a
    /// termination keeps the operator's acknowledgment. An activation of an
    /// unknown alarm is added; when the table is full the inactive alarms are
    /// swept first and, if that frees nothing, [`AlarmTable::remove_oldest`]
    /// makes room.
    pub fn ingest(&self, event: AlarmEvent) -> Result<Ingested> {
        if event.id.is_empty() {
            return Err(AlarmError::InvalidAlarmId);
        }
        self.pipeline.record(&event.id, event.active);

        let record = AlarmRecord::from(event);
        match self.table.apply(&record) {
            Ok(()) => return Ok(Ingested::Updated),
            Err(AlarmError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        if !record.active {
            debug!("Termination of unknown alarm {} ignored", record.id);
            return Ok(Ingested::Ignored);
        }

        let mut swept = 0;
        let mut evicted = None;
        loop {
            match self.table.add(record.clone()) {
                Ok(()) => return Ok(Ingested::Inserted { swept, evicted }),
                Err(AlarmError::CapacityExceeded { .. }) => {
                    let removed = self.table.remove_inactive_of_type(AlarmKind::Any)?;
                    swept += removed;
                    if removed == 0 {
                        match self.table.remove_oldest() {
                            Ok(oldest) => {
                                debug!("Table full, evicted {}", oldest.id);
                                evicted = Some(oldest.id);
                            }
                            // Emptied by other producers since the failed add
                            Err(AlarmError::EmptyContainer) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                // Another producer inserted the same alarm meanwhile
                Err(AlarmError::DuplicateAlarm(_)) => {
                    self.table.apply(&record)?;
                    return Ok(Ingested::Updated);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Acknowledge an alarm
    pub fn acknowledge(&self, id: &str) -> Result<()> {
        self.table.acknowledge(id)
    }
}
