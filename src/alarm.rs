// File: src/alarm.rs
// Alarm records, incoming alarm events and eviction selectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest alarm priority. Larger values are less urgent.
pub const HIGHEST_PRIORITY: u8 = 0;

// ==========================================
// SECTION 1: EVENTS
// ==========================================

/// Activation or termination of an alarm as delivered by the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    /// Unique alarm identifier
    pub id: String,

    /// `true` for an activation, `false` for a termination
    pub active: bool,

    /// Alarm priority, 0 is the highest
    #[serde(default)]
    pub priority: u8,

    /// Source timestamp of the state change
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AlarmEvent {
    /// Activation event stamped with the current time
    pub fn activated(id: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            active: true,
            priority,
            timestamp: Utc::now(),
        }
    }

    /// Termination event stamped with the current time
    pub fn terminated(id: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            active: false,
            priority,
            timestamp: Utc::now(),
        }
    }
}

// ==========================================
// SECTION 2: TABLE RECORDS
// ==========================================

/// An alarm as stored in the [`AlarmTable`](crate::AlarmTable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Unique alarm identifier (table key)
    pub id: String,

    /// Alarm priority, 0 is the highest
    pub priority: u8,

    /// Current activation state
    pub active: bool,

    /// Set once an operator has seen the alarm; cleared on (re)activation
    pub acknowledged: bool,

    /// Time of the last state update
    pub timestamp: DateTime<Utc>,
}

impl AlarmRecord {
    /// New, unacknowledged record
    pub fn new(id: impl Into<String>, priority: u8, active: bool) -> Self {
        Self {
            id: id.into(),
            priority,
            active,
            acknowledged: false,
            timestamp: Utc::now(),
        }
    }

    /// Active and not yet acknowledged
    pub fn is_new(&self) -> bool {
        self.active && !self.acknowledged
    }

    /// Copy the mutable state of `other` into `self`, keeping the identifier.
    pub(crate) fn update_from(&mut self, other: &AlarmRecord) {
        self.priority = other.priority;
        self.active = other.active;
        self.acknowledged = other.acknowledged;
        self.timestamp = other.timestamp;
    }
}

impl From<AlarmEvent> for AlarmRecord {
    fn from(event: AlarmEvent) -> Self {
        Self {
            id: event.id,
            priority: event.priority,
            active: event.active,
            acknowledged: false,
            timestamp: event.timestamp,
        }
    }
}

impl From<&AlarmEvent> for AlarmRecord {
    fn from(event: &AlarmEvent) -> Self {
        AlarmRecord::from(event.clone())
    }
}

// ==========================================
// SECTION 3: EVICTION SELECTOR
// ==========================================

/// Which inactive alarms an eviction sweep removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// Every inactive alarm regardless of priority
    Any,

    /// Inactive alarms with exactly this priority
    Priority(u8),
}

impl AlarmKind {
    /// Whether a record's priority is selected by this kind
    pub fn matches(self, priority: u8) -> bool {
        match self {
            AlarmKind::Any => true,
            AlarmKind::Priority(p) => p == priority,
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmKind::Any => write!(f, "any"),
            AlarmKind::Priority(p) => write!(f, "priority {}", p),
        }
    }
}
