// src/table.rs
//! Bounded alarm table.
//!
//! The table keeps two structures in lock-step: a lookup index from alarm id to
//! record and an ordering sequence of ids. [`AlarmTable::add`] appends at the
//! tail, an alarm that becomes active again through [`AlarmTable::replace`]
//! moves to position 0, and [`AlarmTable::remove_oldest`] takes whatever sits
//! at position 0.
//!
//! Both structures live behind one [`RwLock`]; every mutation holds the write
//! lock for its whole duration, so readers never see one structure updated
//! without the other.

use crate::alarm::{AlarmKind, AlarmRecord, HIGHEST_PRIORITY};
use crate::error::{AlarmError, Result};
use tracing::{debug, error};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
struct TableInner {
    entries: HashMap<String, AlarmRecord>,
    order: VecDeque<String>,
}

impl TableInner {
    fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|key| key == id)
    }

    fn remove(&mut self, id: &str) -> Result<AlarmRecord> {
        let pos = match self.position(id) {
            Some(pos) => pos,
            None if self.entries.contains_key(id) => {
                return Err(invariant(format!("{} is indexed but has no position", id)));
            }
            None => return Err(AlarmError::NotFound(id.to_string())),
        };
        self.order.remove(pos);
        self.entries
            .remove(id)
            .ok_or_else(|| invariant(format!("{} had a position but no entry", id)))
    }
}

fn invariant(message: String) -> AlarmError {
    error!("Inconsistent alarm table: {}", message);
    AlarmError::InvariantViolated(message)
}

/// Thread-safe, bounded, order-tracking store of alarm records
///
/// # Examples
///
/// ```rust
/// use annunciator::{AlarmRecord, AlarmTable};
///
/// let table = AlarmTable::new(2)?;
/// table.add(AlarmRecord::new("PS:TEMP:1", 1, true))?;
/// table.add(AlarmRecord::new("PS:TEMP:2", 3, true))?;
/// assert!(table.is_full());
///
/// let evicted = table.remove_oldest()?;
/// assert_eq!(evicted.id, "PS:TEMP:1");
/// # Ok::<(), annunciator::AlarmError>(())
/// ```
#[derive(Debug)]
pub struct AlarmTable {
    inner: RwLock<TableInner>,
    max_alarms: usize,
}

impl AlarmTable {
    /// Create an empty table holding at most `max_alarms` records
    pub fn new(max_alarms: usize) -> Result<Self> {
        if max_alarms == 0 {
            return Err(AlarmError::Config(
                "max_alarms must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            inner: RwLock::new(TableInner {
                entries: HashMap::with_capacity(max_alarms),
                order: VecDeque::with_capacity(max_alarms),
            }),
            max_alarms,
        })
    }

    /// Maximum number of records
    pub fn capacity(&self) -> usize {
        self.max_alarms
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_alarms
    }

    /// Append a record at the tail of the ordering sequence.
    ///
    /// Never evicts: when the table is full the caller gets
    /// [`AlarmError::CapacityExceeded`] and decides what to drop.
    pub fn add(&self, record: AlarmRecord) -> Result<()> {
        if record.id.is_empty() {
            return Err(AlarmError::InvalidAlarmId);
        }
        let mut inner = self.inner.write();
        if inner.order.len() >= self.max_alarms {
            return Err(AlarmError::CapacityExceeded {
                capacity: self.max_alarms,
            });
        }
        let indexed = inner.entries.contains_key(&record.id);
        let positioned = inner.position(&record.id).is_some();
        match (indexed, positioned) {
            (true, true) => return Err(AlarmError::DuplicateAlarm(record.id)),
            (false, false) => {}
            _ => {
                return Err(invariant(format!(
                    "{} present in only one of index and ordering",
                    record.id
                )))
            }
        }
        debug!("Adding alarm {} (priority {})", record.id, record.priority);
        inner.order.push_back(record.id.clone());
        inner.entries.insert(record.id.clone(), record);
        Ok(())
    }

    /// Whether a record with this id is stored
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().entries.contains_key(id)
    }

    /// Copy of the record with this id
    pub fn get(&self, id: &str) -> Option<AlarmRecord> {
        self.inner.read().entries.get(id).cloned()
    }

    /// Copy of the record at `position` in the ordering sequence
    pub fn get_at(&self, position: usize) -> Result<AlarmRecord> {
        let inner = self.inner.read();
        let len = inner.order.len();
        let id = inner
            .order
            .get(position)
            .ok_or(AlarmError::IndexOutOfRange { position, len })?;
        inner
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| invariant(format!("no entry for {} at position {}", id, position)))
    }

    /// Position of `id` in the ordering sequence
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.inner.read().position(id)
    }

    /// Remove and return the record at position 0 of the ordering sequence.
    pub fn remove_oldest(&self) -> Result<AlarmRecord> {
        let mut inner = self.inner.write();
        let id = inner.order.pop_front().ok_or(AlarmError::EmptyContainer)?;
        let removed = inner
            .entries
            .remove(&id)
            .ok_or_else(|| invariant(format!("oldest id {} has no entry", id)))?;
        debug!("Evicted oldest alarm {}", id);
        Ok(removed)
    }

    /// Remove the record with this id
    pub fn remove(&self, id: &str) -> Result<AlarmRecord> {
        self.inner.write().remove(id)
    }

    /// Remove every inactive record selected by `kind` and return how many
    /// were removed. Active records are never touched.
    pub fn remove_inactive_of_type(&self, kind: AlarmKind) -> Result<usize> {
        let mut inner = self.inner.write();
        let keys: Vec<String> = inner.entries.keys().cloned().collect();
        let mut removed = 0;
        for key in keys {
            let record = inner
                .entries
                .get(&key)
                .ok_or_else(|| invariant(format!("key {} vanished during sweep", key)))?;
            if record.active || !kind.matches(record.priority) {
                continue;
            }
            inner.remove(&key)?;
            removed += 1;
        }
        if removed > 0 {
            debug!("Removed {} inactive alarms of type {}", removed, kind);
        }
        Ok(removed)
    }

    /// Update the stored record in place from `new_record`.
    ///
    /// An active new state moves the alarm to the head of the ordering
    /// sequence; an inactive one leaves its position alone.
    pub fn replace(&self, new_record: &AlarmRecord) -> Result<()> {
        self.update(new_record, false)
    }

    /// Like [`replace`](Self::replace), but a termination keeps the stored
    /// acknowledgment. The merge happens under the write lock, so an
    /// [`acknowledge`](Self::acknowledge) from another thread is never lost.
    pub fn apply(&self, new_record: &AlarmRecord) -> Result<()> {
        self.update(new_record, true)
    }

    fn update(&self, new_record: &AlarmRecord, keep_ack_on_termination: bool) -> Result<()> {
        let mut inner = self.inner.write();
        let pos = match inner.position(&new_record.id) {
            Some(pos) => pos,
            None if inner.entries.contains_key(&new_record.id) => {
                return Err(invariant(format!(
                    "{} is indexed but has no position",
                    new_record.id
                )));
            }
            None => return Err(AlarmError::NotFound(new_record.id.clone())),
        };
        let entry = inner
            .entries
            .get_mut(&new_record.id)
            .ok_or_else(|| invariant(format!("{} has a position but no entry", new_record.id)))?;
        let acknowledged = entry.acknowledged;
        entry.update_from(new_record);
        if keep_ack_on_termination && !new_record.active {
            entry.acknowledged = acknowledged;
        }
        if new_record.active && pos != 0 {
            if let Some(key) = inner.order.remove(pos) {
                inner.order.push_front(key);
            }
        }
        Ok(())
    }

    /// Mark an alarm as seen by an operator
    pub fn acknowledge(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| AlarmError::NotFound(id.to_string()))?;
        entry.acknowledged = true;
        Ok(())
    }

    /// Highest priority (lowest value) among active, unacknowledged alarms,
    /// or `None` when nothing is waiting for acknowledgment.
    pub fn highest_priority_unacknowledged(&self) -> Option<u8> {
        let inner = self.inner.read();
        let mut highest: Option<u8> = None;
        for record in inner.entries.values() {
            if !record.is_new() {
                continue;
            }
            if highest.map_or(true, |p| record.priority < p) {
                highest = Some(record.priority);
            }
            if highest == Some(HIGHEST_PRIORITY) {
                break;
            }
        }
        highest
    }

    /// Drop every record
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Ids in ordering-sequence order
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().order.iter().cloned().collect()
    }

    /// Records in ordering-sequence order
    pub fn records(&self) -> Result<Vec<AlarmRecord>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .map(|id| {
                inner
                    .entries
                    .get(id)
                    .cloned()
                    .ok_or_else(|| invariant(format!("no entry for {}", id)))
            })
            .collect()
    }

    /// Verify that the lookup index and the ordering sequence hold the same ids.
    pub fn check_consistency(&self) -> Result<()> {
        let inner = self.inner.read();
        let ordered: HashSet<&str> = inner.order.iter().map(String::as_str).collect();
        if ordered.len() != inner.order.len() {
            return Err(invariant("duplicate ids in ordering sequence".to_string()));
        }
        if ordered.len() != inner.entries.len()
            || !inner.entries.keys().all(|k| ordered.contains(k.as_str()))
        {
            return Err(invariant(format!(
                "index holds {} ids, ordering holds {}",
                inner.entries.len(),
                ordered.len()
            )));
        }
        Ok(())
    }
}
