//! Composite time index shared by the telemetry store and the event log.
//!
//! Records live in a `BTreeMap` keyed by `(timestamp, machine, sequence)`,
//! which gives ordered range scans over the whole fleet. A secondary
//! per-machine set of `(timestamp, sequence)` keys answers "latest for machine"
//! with a single `next_back()` and lets a machine's records be removed without
//! scanning the primary map.

use crate::error::{StoreError, StoreResult};
use crate::models::{Decision, MachineId, Reading};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// A record that can be stored in a [`TimeIndex`].
pub trait TimeSeriesRecord: Clone {
    fn timestamp(&self) -> DateTime<Utc>;
    fn machine_id(&self) -> MachineId;
    /// Store-assigned sequence number; unique within one index.
    fn sequence(&self) -> u64;
}

impl TimeSeriesRecord for Reading {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    fn sequence(&self) -> u64 {
        self.id.0
    }
}

impl TimeSeriesRecord for Decision {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    fn sequence(&self) -> u64 {
        self.id.0
    }
}

/// Time window with explicit inclusivity on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub from_inclusive: bool,
    pub to_inclusive: bool,
}

impl TimeRange {
    /// `[from, to]`
    pub fn inclusive(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            from_inclusive: true,
            to_inclusive: true,
        }
    }

    /// `[from, to)`
    pub fn half_open(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            from_inclusive: true,
            to_inclusive: false,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.from > self.to {
            return Err(StoreError::InvalidRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }

    /// A degenerate window such as `[t, t)` or `(t, t]`.
    pub fn is_empty(&self) -> bool {
        self.from > self.to || (self.from == self.to && !(self.from_inclusive && self.to_inclusive))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let lower_ok = if self.from_inclusive { ts >= self.from } else { ts > self.from };
        let upper_ok = if self.to_inclusive { ts <= self.to } else { ts < self.to };
        lower_ok && upper_ok
    }

    fn primary_bounds(&self) -> (Bound<PrimaryKey>, Bound<PrimaryKey>) {
        let lower = if self.from_inclusive {
            Bound::Included((self.from, MachineId::MIN, 0))
        } else {
            Bound::Excluded((self.from, MachineId::MAX, u64::MAX))
        };
        let upper = if self.to_inclusive {
            Bound::Included((self.to, MachineId::MAX, u64::MAX))
        } else {
            Bound::Excluded((self.to, MachineId::MIN, 0))
        };
        (lower, upper)
    }

    fn machine_bounds(&self) -> (Bound<MachineKey>, Bound<MachineKey>) {
        let lower = if self.from_inclusive {
            Bound::Included((self.from, 0))
        } else {
            Bound::Excluded((self.from, u64::MAX))
        };
        let upper = if self.to_inclusive {
            Bound::Included((self.to, u64::MAX))
        } else {
            Bound::Excluded((self.to, 0))
        };
        (lower, upper)
    }
}

type PrimaryKey = (DateTime<Utc>, MachineId, u64);
type MachineKey = (DateTime<Utc>, u64);

#[derive(Debug, Clone)]
pub struct TimeIndex<T> {
    by_time: BTreeMap<PrimaryKey, T>,
    by_machine: HashMap<MachineId, BTreeSet<MachineKey>>,
    next_seq: u64,
}

impl<T> Default for TimeIndex<T> {
    fn default() -> Self {
        Self {
            by_time: BTreeMap::new(),
            by_machine: HashMap::new(),
            next_seq: 1,
        }
    }
}

impl<T: TimeSeriesRecord> TimeIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }

    /// Reserve the next sequence number for a record about to be inserted.
    pub fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert a record. Sequence numbers coming from outside (snapshot
    /// restores) push the allocator forward so later appends never collide.
    pub fn insert(&mut self, record: T) {
        let ts = record.timestamp();
        let machine = record.machine_id();
        let seq = record.sequence();
        if seq >= self.next_seq {
            self.next_seq = seq + 1;
        }
        self.by_machine.entry(machine).or_default().insert((ts, seq));
        self.by_time.insert((ts, machine, seq), record);
    }

    fn lookup(&self, machine: MachineId, key: &MachineKey) -> Option<&T> {
        self.by_time.get(&(key.0, machine, key.1))
    }

    pub fn latest(&self, machine: MachineId) -> Option<&T> {
        let key = self.by_machine.get(&machine)?.last()?;
        self.lookup(machine, key)
    }

    /// Latest record with `timestamp <= as_of`.
    pub fn latest_at(&self, machine: MachineId, as_of: DateTime<Utc>) -> Option<&T> {
        let key = self
            .by_machine
            .get(&machine)?
            .range(..=(as_of, u64::MAX))
            .next_back()?;
        self.lookup(machine, key)
    }

    pub fn count_for(&self, machine: MachineId) -> usize {
        self.by_machine.get(&machine).map_or(0, BTreeSet::len)
    }

    /// Records within `range`, ascending by timestamp. Ties are ordered by
    /// machine id, then by sequence.
    pub fn range<'a>(
        &'a self,
        machine: Option<MachineId>,
        range: TimeRange,
    ) -> StoreResult<Box<dyn Iterator<Item = &'a T> + 'a>> {
        range.validate()?;
        if range.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        match machine {
            None => Ok(Box::new(self.by_time.range(range.primary_bounds()).map(|(_, r)| r))),
            Some(machine) => match self.by_machine.get(&machine) {
                Some(keys) => Ok(Box::new(
                    keys.range(range.machine_bounds())
                        .filter_map(move |key| self.lookup(machine, key)),
                )),
                None => Ok(Box::new(std::iter::empty())),
            },
        }
    }

    /// The `n` most recent records across all machines, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        self.by_time.values().rev().take(n)
    }

    /// All records for one machine, newest first.
    pub fn for_machine(&self, machine: MachineId) -> impl Iterator<Item = &T> + '_ {
        self.by_machine
            .get(&machine)
            .into_iter()
            .flat_map(|keys| keys.iter().rev())
            .filter_map(move |key| self.lookup(machine, key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.by_time.values()
    }

    /// Drop every record of `machine` from both indexes. Returns the count removed.
    pub fn remove_machine(&mut self, machine: MachineId) -> usize {
        let Some(keys) = self.by_machine.remove(&machine) else {
            return 0;
        };
        for (ts, seq) in &keys {
            self.by_time.remove(&(*ts, machine, *seq));
        }
        keys.len()
    }

    /// Drop every record with `timestamp < cutoff`. Returns the count removed.
    pub fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let kept = self.by_time.split_off(&(cutoff, MachineId::MIN, 0));
        let purged = std::mem::replace(&mut self.by_time, kept);
        for (ts, machine, seq) in purged.keys() {
            if let Some(keys) = self.by_machine.get_mut(machine) {
                keys.remove(&(*ts, *seq));
                if keys.is_empty() {
                    self.by_machine.remove(machine);
                }
            }
        }
        purged.len()
    }

    pub fn clear(&mut self) {
        self.by_time.clear();
        self.by_machine.clear();
    }
}
