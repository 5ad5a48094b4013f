// src/statistics.rs
//! Per-interval alarm counters and the summaries computed from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Activations and terminations of one alarm during an interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmCounts {
    pub activations: u64,
    pub terminations: u64,
}

impl AlarmCounts {
    pub fn update(&mut self, active: bool) {
        if active {
            self.activations += 1;
        } else {
            self.terminations += 1;
        }
    }

    /// Activations plus terminations
    pub fn operations(&self) -> u64 {
        self.activations + self.terminations
    }
}

/// Counters receiving updates for the interval in progress
#[derive(Debug, Clone)]
pub struct IntervalCounters {
    started_at: DateTime<Utc>,
    counts: HashMap<String, AlarmCounts>,
}

impl IntervalCounters {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            counts: HashMap::new(),
        }
    }

    /// Count one state change of `id`
    pub fn update(&mut self, id: &str, active: bool) {
        match self.counts.get_mut(id) {
            Some(counts) => counts.update(active),
            None => {
                let mut counts = AlarmCounts::default();
                counts.update(active);
                self.counts.insert(id.to_string(), counts);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<AlarmCounts> {
        self.counts.get(id).copied()
    }

    /// Number of distinct alarms seen
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Detach the counters from live updates
    pub fn seal(self, ended_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            started_at: self.started_at,
            ended_at,
            counts: self.counts,
        }
    }
}

impl Default for IntervalCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters of a finished interval, waiting for aggregation
#[derive(Debug, Clone)]
pub struct Snapshot {
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    counts: HashMap<String, AlarmCounts>,
}

impl Snapshot {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<AlarmCounts> {
        self.counts.get(id).copied()
    }
}

/// One entry of a top-N ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedAlarm {
    pub id: String,
    pub activations: u64,
    pub terminations: u64,
    pub operations: u64,
}

/// Figures computed for one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Number of different alarms that changed state
    pub total_alarms: usize,
    pub total_activations: u64,
    pub total_terminations: u64,
    pub total_operations: u64,
    /// Operations per second over the configured interval length
    pub avg_operations_per_second: f64,
    pub top_by_activations: Vec<RankedAlarm>,
    pub top_by_terminations: Vec<RankedAlarm>,
    pub top_by_operations: Vec<RankedAlarm>,
}

/// Compute the summary of a snapshot.
///
/// Rankings are descending by their criterion. Ties keep the snapshot's
/// iteration order, which is not stable across runs.
pub fn summarize(snapshot: &Snapshot, interval: Duration, top_n: usize) -> IntervalSummary {
    let mut total_activations = 0;
    let mut total_terminations = 0;
    let mut ranked = Vec::with_capacity(snapshot.counts.len());
    for (id, counts) in &snapshot.counts {
        total_activations += counts.activations;
        total_terminations += counts.terminations;
        ranked.push(RankedAlarm {
            id: id.clone(),
            activations: counts.activations,
            terminations: counts.terminations,
            operations: counts.operations(),
        });
    }
    let total_operations = total_activations + total_terminations;

    let seconds = interval.as_secs_f64();
    let avg_operations_per_second = if seconds > 0.0 {
        total_operations as f64 / seconds
    } else {
        0.0
    };

    IntervalSummary {
        started_at: snapshot.started_at,
        ended_at: snapshot.ended_at,
        total_alarms: snapshot.counts.len(),
        total_activations,
        total_terminations,
        total_operations,
        avg_operations_per_second,
        top_by_activations: top(&ranked, top_n, |r| r.activations),
        top_by_terminations: top(&ranked, top_n, |r| r.terminations),
        top_by_operations: top(&ranked, top_n, |r| r.operations),
    }
}

fn top<F>(ranked: &[RankedAlarm], n: usize, key: F) -> Vec<RankedAlarm>
where
    F: Fn(&RankedAlarm) -> u64,
{
    let mut sorted = ranked.to_vec();
    sorted.sort_by(|a, b| key(b).cmp(&key(a)));
    sorted.truncate(n);
    sorted
}
