// src/config.rs - Configuration of the alarm table and the statistics pipeline

use crate::error::{AlarmError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Top-level configuration
///
/// ```yaml
/// table:
///   max_alarms: 500
/// statistics:
///   interval_length_minutes: 10
///   queue_capacity: 10
///   top_n: 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Alarm table configuration
    #[serde(default)]
    pub table: TableConfig,

    /// Statistics pipeline configuration
    #[serde(default)]
    pub statistics: StatisticsConfig,
}

impl CoreConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CoreConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.table.validate()?;
        self.statistics.validate()
    }
}

// ============================================================================
// ALARM TABLE
// ============================================================================

/// Alarm table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Maximum number of alarms held by the table
    #[serde(default = "default_max_alarms")]
    pub max_alarms: usize,
}

impl TableConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_alarms == 0 {
            return Err(AlarmError::Config(
                "table.max_alarms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_alarms: default_max_alarms(),
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Statistics pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Length of each statistics interval; 0 disables statistics entirely
    #[serde(default = "default_interval_length")]
    pub interval_length_minutes: u32,

    /// Number of finished intervals allowed to wait for aggregation
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Length of each top-N ranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl StatisticsConfig {
    /// Statistics with the given interval and default queue and ranking sizes
    pub fn with_interval(interval_length_minutes: u32) -> Self {
        Self {
            interval_length_minutes,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_length_minutes > 0
    }

    /// Interval length as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_length_minutes) * 60)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(AlarmError::Config(
                "statistics.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(AlarmError::Config(
                "statistics.top_n must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            interval_length_minutes: default_interval_length(),
            queue_capacity: default_queue_capacity(),
            top_n: default_top_n(),
        }
    }
}

fn default_max_alarms() -> usize {
    10_000
}

fn default_interval_length() -> u32 {
    10
}

fn default_queue_capacity() -> usize {
    10
}

fn default_top_n() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = CoreConfig::from_yaml("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.statistics.queue_capacity, 10);
        assert_eq!(config.statistics.top_n, 5);
        assert!(config.statistics.is_enabled());
    }

    #[test]
    fn test_partial_document() {
        let yaml = r#"
table:
  max_alarms: 3
statistics:
  interval_length_minutes: 0
"#;
        let config = CoreConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.table.max_alarms, 3);
        assert!(!config.statistics.is_enabled());
        assert_eq!(config.statistics.interval(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CoreConfig::from_yaml("table:\n  max_alarms: 0\n"),
            Err(AlarmError::Config(_))
        ));
        assert!(matches!(
            CoreConfig::from_yaml("statistics:\n  queue_capacity: 0\n"),
            Err(AlarmError::Config(_))
        ));
        assert!(matches!(
            CoreConfig::from_yaml("statistics: [1, 2]"),
            Err(AlarmError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.yaml");
        std::fs::write(&path, "statistics:\n  interval_length_minutes: 1\n").unwrap();
        let config = CoreConfig::from_file(&path).unwrap();
        assert_eq!(config.statistics.interval(), Duration::from_secs(60));
    }
}
