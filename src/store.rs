//! Thread-safe facade over the machine registry, the telemetry store and the
//! event log.
//!
//! Each collection sits behind its own `RwLock`. Locks are always taken in the
//! order registry → readings → decisions. Writers that reference a machine hold
//! the registry read lock for the duration of the insert, so a concurrent
//! `delete_machine` (registry write lock) either runs entirely before the
//! append, which then fails validation, or entirely after it, and then purges
//! the new record along with the rest. Readers copy results out under a read
//! lock; nothing borrowed escapes the guard.

use crate::analytics::{self, BuildingSummary, EnergyComparison, MachineOverview};
use crate::config::AnalyticsConfig;
use crate::error::StoreResult;
use crate::events::EventLog;
use crate::index::TimeRange;
use crate::models::{Decision, DecisionId, Machine, MachineId, MachineSpec, NewDecision, NewReading, Reading, ReadingId};
use crate::registry::MachineRegistry;
use crate::telemetry::{BatchOutcome, TelemetryStore};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;

/// Counts removed by [`TelemetryDb::delete_machine`].
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeReport {
    pub machine: Machine,
    pub readings_removed: usize,
    pub decisions_removed: usize,
}

#[derive(Debug, Default)]
pub struct TelemetryDb {
    machines: RwLock<MachineRegistry>,
    readings: RwLock<TelemetryStore>,
    decisions: RwLock<EventLog>,
    settings: AnalyticsConfig,
}

impl TelemetryDb {
    pub fn new(settings: AnalyticsConfig) -> Self {
        Self {
            machines: RwLock::new(MachineRegistry::new()),
            readings: RwLock::new(TelemetryStore::new()),
            decisions: RwLock::new(EventLog::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &AnalyticsConfig {
        &self.settings
    }

    // --- machines ---

    pub fn create_machine(&self, spec: MachineSpec) -> StoreResult<MachineId> {
        let id = self.machines.write().create(spec)?;
        debug!("Registry: created machine {}", id.0);
        Ok(id)
    }

    pub fn get_machine(&self, id: MachineId) -> StoreResult<Machine> {
        self.machines.read().get(id).cloned()
    }

    pub fn list_machines(&self) -> Vec<Machine> {
        self.machines.read().list().cloned().collect()
    }

    pub fn update_machine(&self, id: MachineId, spec: MachineSpec) -> StoreResult<Machine> {
        self.machines.write().update(id, spec).cloned()
    }

    /// Remove a machine and every reading and decision that references it.
    /// The registry write lock is held until both indexes are purged, so no
    /// reader can observe orphaned records.
    pub fn delete_machine(&self, id: MachineId) -> StoreResult<CascadeReport> {
        let mut machines = self.machines.write();
        let machine = machines.delete(id)?;
        let readings_removed = self.readings.write().remove_machine(id);
        let decisions_removed = self.decisions.write().remove_machine(id);
        drop(machines);

        info!(
            "Registry: deleted machine {} ({}), cascaded {} reading(s) and {} decision(s)",
            id.0, machine.name, readings_removed, decisions_removed
        );
        Ok(CascadeReport {
            machine,
            readings_removed,
            decisions_removed,
        })
    }

    // --- readings ---

    pub fn append_reading(&self, reading: NewReading) -> StoreResult<ReadingId> {
        let machines = self.machines.read();
        self.readings.write().append(&machines, reading)
    }

    /// One critical section for the whole batch; readers wait for it to finish.
    pub fn append_readings(&self, readings: Vec<NewReading>) -> BatchOutcome<ReadingId> {
        let machines = self.machines.read();
        self.readings.write().append_batch(&machines, readings)
    }

    /// Latest reading of a known machine; `NotFound` for unknown ids.
    pub fn latest_for(&self, id: MachineId) -> StoreResult<Option<Reading>> {
        let machines = self.machines.read();
        machines.get(id)?;
        Ok(self.readings.read().latest_for(id).cloned())
    }

    pub fn range_readings(&self, machine: Option<MachineId>, range: TimeRange) -> StoreResult<Vec<Reading>> {
        let machines = self.machines.read();
        if let Some(id) = machine {
            machines.get(id)?;
        }
        let readings = self.readings.read();
        let rows = readings.range_query(machine, range)?.cloned().collect();
        Ok(rows)
    }

    pub fn recent_readings(&self, n: usize) -> Vec<Reading> {
        self.readings.read().recent(n).cloned().collect()
    }

    /// All readings of one machine, newest first.
    pub fn readings_for(&self, id: MachineId) -> StoreResult<Vec<Reading>> {
        let machines = self.machines.read();
        machines.get(id)?;
        Ok(self.readings.read().for_machine(id).cloned().collect())
    }

    pub fn reading_count(&self) -> usize {
        self.readings.read().len()
    }

    /// Drop readings strictly older than `cutoff`.
    pub fn purge_readings_before(&self, cutoff: DateTime<Utc>) -> usize {
        let removed = self.readings.write().purge_before(cutoff);
        info!("Telemetry: purged {} reading(s) older than {}", removed, cutoff);
        removed
    }

    // --- decisions ---

    pub fn append_decision(&self, decision: NewDecision) -> StoreResult<DecisionId> {
        let machines = self.machines.read();
        self.decisions.write().append(&machines, decision)
    }

    pub fn append_decisions(&self, decisions: Vec<NewDecision>) -> BatchOutcome<DecisionId> {
        let machines = self.machines.read();
        self.decisions.write().append_batch(&machines, decisions)
    }

    pub fn range_decisions(&self, machine: Option<MachineId>, range: TimeRange) -> StoreResult<Vec<Decision>> {
        let machines = self.machines.read();
        if let Some(id) = machine {
            machines.get(id)?;
        }
        let decisions = self.decisions.read();
        let rows = decisions.range_query(machine, range)?.cloned().collect();
        Ok(rows)
    }

    pub fn recent_decisions(&self, n: usize) -> Vec<Decision> {
        self.decisions.read().recent(n).cloned().collect()
    }

    /// Decisions for one machine, newest first.
    pub fn decisions_for(&self, id: MachineId) -> StoreResult<Vec<Decision>> {
        let machines = self.machines.read();
        machines.get(id)?;
        Ok(self.decisions.read().for_machine(id).cloned().collect())
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.read().len()
    }

    pub fn purge_decisions_before(&self, cutoff: DateTime<Utc>) -> usize {
        let removed = self.decisions.write().purge_before(cutoff);
        info!("Events: purged {} decision(s) older than {}", removed, cutoff);
        removed
    }

    // --- analytics ---

    pub fn building_summary(&self, as_of: DateTime<Utc>) -> BuildingSummary {
        let machines = self.machines.read();
        let readings = self.readings.read();
        analytics::building_summary(&machines, &readings, as_of)
    }

    /// Energy comparison using the configured window, split and sample interval.
    pub fn energy_comparison(&self, as_of: DateTime<Utc>) -> StoreResult<EnergyComparison> {
        let readings = self.readings.read();
        analytics::energy_comparison(&readings, as_of, self.settings.comparison)
    }

    /// Energy comparison with an explicit window and split, in days.
    pub fn energy_comparison_with(
        &self,
        as_of: DateTime<Utc>,
        window_days: i64,
        split_days: i64,
    ) -> StoreResult<EnergyComparison> {
        let mut window = self.settings.comparison;
        window.window_days = window_days;
        window.split_days = split_days;
        let readings = self.readings.read();
        analytics::energy_comparison(&readings, as_of, window)
    }

    /// The configured number of most recent readings.
    pub fn recent_activity(&self) -> Vec<Reading> {
        self.recent_readings(self.settings.recent_limit)
    }

    /// The configured number of most recent decisions.
    pub fn recent_decision_log(&self) -> Vec<Decision> {
        self.recent_decisions(self.settings.recent_limit)
    }

    pub fn machine_overview(&self) -> Vec<MachineOverview> {
        let machines = self.machines.read();
        let readings = self.readings.read();
        analytics::machine_overview(&machines, &readings)
    }

    // --- bulk maintenance ---

    /// Remove all machines, readings and decisions.
    pub fn clear(&self) {
        let mut machines = self.machines.write();
        let mut readings = self.readings.write();
        let mut decisions = self.decisions.write();
        decisions.clear();
        readings.clear();
        machines.clear();
    }

    /// Re-insert previously persisted state, keeping all ids. Records that
    /// reference unknown machines are rejected like any other append.
    pub fn restore(&self, machines: Vec<Machine>, readings: Vec<Reading>, decisions: Vec<Decision>) -> StoreResult<()> {
        let mut registry = self.machines.write();
        for machine in machines {
            registry.restore(machine)?;
        }
        let mut store = self.readings.write();
        for reading in readings {
            store.restore(&registry, reading)?;
        }
        let mut log = self.decisions.write();
        for decision in decisions {
            log.restore(&registry, decision)?;
        }
        Ok(())
    }

    /// Clone the full state, in id order for machines and time order for records.
    pub fn snapshot(&self) -> (Vec<Machine>, Vec<Reading>, Vec<Decision>) {
        let machines = self.machines.read();
        let readings = self.readings.read();
        let decisions = self.decisions.read();
        (
            machines.list().cloned().collect(),
            readings.iter().cloned().collect(),
            decisions.iter().cloned().collect(),
        )
    }
}
