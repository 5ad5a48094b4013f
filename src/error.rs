use thiserror::Error;

/// Error type shared by the alarm table, the statistics pipeline and the service.
///
/// Variants fall into two tiers. Ordinary conditions (capacity, duplicates,
/// missing alarms, empty table, bad positions) are expected and the caller
/// branches on them. [`AlarmError::InvariantViolated`] means the table's
/// internal structures diverged and must never be retried or patched over.
#[derive(Error, Debug)]
pub enum AlarmError {
    /// The table already holds its maximum number of alarms
    #[error("Alarm table full: capacity {capacity}")]
    CapacityExceeded { capacity: usize },

    /// An alarm with the same identifier is already stored
    #[error("Alarm already in the table: {0}")]
    DuplicateAlarm(String),

    /// No alarm with the given identifier is stored
    #[error("Alarm not found: {0}")]
    NotFound(String),

    /// Removal requested on an empty table
    #[error("The alarm table is empty")]
    EmptyContainer,

    /// Positional access outside `[0, len)`
    #[error("Position {position} out of range [0, {len})")]
    IndexOutOfRange { position: usize, len: usize },

    /// Alarm identifiers must be non-empty
    #[error("Invalid alarm ID")]
    InvalidAlarmId,

    /// Lookup index and ordering sequence disagree
    #[error("Internal invariant violated: {0}")]
    InvariantViolated(String),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error while encoding or decoding JSON records
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AlarmError {
    /// `false` only for broken internal invariants.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AlarmError::InvariantViolated(_))
    }
}

/// Convenient alias over [`Result`] using [`AlarmError`]
pub type Result<T> = std::result::Result<T, AlarmError>;
