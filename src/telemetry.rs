//! Append-only store of telemetry readings.

use crate::error::{StoreError, StoreResult};
use crate::index::{TimeIndex, TimeRange};
use crate::models::{MachineId, NewReading, Reading, ReadingId};
use crate::registry::MachineRegistry;
use chrono::{DateTime, Utc};
use log::{debug, warn};

/// Per-item result of a batch append, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<I> {
    pub results: Vec<StoreResult<I>>,
}

impl<I> BatchOutcome<I> {
    pub fn accepted(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn rejected(&self) -> usize {
        self.results.len() - self.accepted()
    }

    /// `(input position, error)` for every rejected item.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &StoreError)> + '_ {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}

fn finite_or_absent(field: &str, value: Option<f64>) -> StoreResult<()> {
    match value {
        Some(v) if !v.is_finite() => Err(StoreError::validation(format!("{} must be finite, got {}", field, v))),
        _ => Ok(()),
    }
}

pub(crate) fn validate_reading(registry: &MachineRegistry, reading: &NewReading) -> StoreResult<()> {
    if !registry.contains(reading.machine_id) {
        return Err(StoreError::validation(format!(
            "reading references unknown machine {}",
            reading.machine_id.0
        )));
    }
    if !reading.power_kw.is_finite() || reading.power_kw < 0.0 {
        return Err(StoreError::validation(format!(
            "power_kw must be a non-negative number, got {}",
            reading.power_kw
        )));
    }
    finite_or_absent("temperature", reading.temperature)?;
    finite_or_absent("speed_percent", reading.speed_percent)?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    index: TimeIndex<Reading>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn append(&mut self, registry: &MachineRegistry, reading: NewReading) -> StoreResult<ReadingId> {
        validate_reading(registry, &reading)?;
        let id = ReadingId(self.index.allocate_seq());
        debug!(
            "Telemetry: reading {} for machine {} at {}",
            id.0, reading.machine_id.0, reading.timestamp
        );
        self.index.insert(Reading::from_new(id, reading));
        Ok(id)
    }

    /// Validate and insert each reading independently; a rejected item never
    /// affects its neighbours.
    pub fn append_batch(&mut self, registry: &MachineRegistry, readings: Vec<NewReading>) -> BatchOutcome<ReadingId> {
        let results = readings
            .into_iter()
            .map(|reading| -> StoreResult<ReadingId> {
                validate_reading(registry, &reading)?;
                let id = ReadingId(self.index.allocate_seq());
                self.index.insert(Reading::from_new(id, reading));
                Ok(id)
            })
            .collect::<Vec<_>>();

        let outcome = BatchOutcome { results };
        if outcome.rejected() > 0 {
            warn!(
                "Telemetry: batch accepted {} reading(s), rejected {}",
                outcome.accepted(),
                outcome.rejected()
            );
        } else {
            debug!("Telemetry: batch accepted {} reading(s)", outcome.accepted());
        }
        outcome
    }

    /// Re-insert a previously stored reading, keeping its id.
    pub fn restore(&mut self, registry: &MachineRegistry, reading: Reading) -> StoreResult<()> {
        let probe = NewReading {
            timestamp: reading.timestamp,
            machine_id: reading.machine_id,
            power_kw: reading.power_kw,
            temperature: reading.temperature,
            speed_percent: reading.speed_percent,
            is_on: reading.is_on,
        };
        validate_reading(registry, &probe)?;
        self.index.insert(reading);
        Ok(())
    }

    pub fn latest_for(&self, machine: MachineId) -> Option<&Reading> {
        self.index.latest(machine)
    }

    pub fn latest_at(&self, machine: MachineId, as_of: DateTime<Utc>) -> Option<&Reading> {
        self.index.latest_at(machine, as_of)
    }

    pub fn count_for(&self, machine: MachineId) -> usize {
        self.index.count_for(machine)
    }

    /// Readings in `range` ordered by timestamp ascending; all machines when
    /// `machine` is `None`.
    pub fn range_query<'a>(
        &'a self,
        machine: Option<MachineId>,
        range: TimeRange,
    ) -> StoreResult<impl Iterator<Item = &'a Reading> + 'a> {
        self.index.range(machine, range)
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Reading> + '_ {
        self.index.recent(n)
    }

    pub fn for_machine(&self, machine: MachineId) -> impl Iterator<Item = &Reading> + '_ {
        self.index.for_machine(machine)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.index.iter()
    }

    pub fn remove_machine(&mut self, machine: MachineId) -> usize {
        self.index.remove_machine(machine)
    }

    pub fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.index.purge_before(cutoff)
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{machine_types, MachineSpec};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn fixture() -> (MachineRegistry, MachineId) {
        let mut registry = MachineRegistry::new();
        let id = registry
            .create(MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0))
            .unwrap();
        (registry, id)
    }

    #[test]
    fn append_validates_power_and_machine() {
        let (registry, id) = fixture();
        let mut store = TelemetryStore::new();

        assert!(store.append(&registry, NewReading::new(t0(), id, 30.0, true)).is_ok());
        assert!(matches!(
            store.append(&registry, NewReading::new(t0(), id, -0.5, true)),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.append(&registry, NewReading::new(t0(), MachineId(404), 1.0, true)),
            Err(StoreError::Validation(_))
        ));
        let mut nan_temp = NewReading::new(t0(), id, 1.0, true);
        nan_temp.temperature = Some(f64::NAN);
        assert!(store.append(&registry, nan_temp).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn batch_reports_each_item() {
        let (registry, id) = fixture();
        let mut store = TelemetryStore::new();
        let batch = vec![
            NewReading::new(t0(), id, 10.0, true),
            NewReading::new(t0() + Duration::minutes(5), id, -1.0, true),
            NewReading::new(t0() + Duration::minutes(10), MachineId(9), 1.0, false),
            NewReading::new(t0() + Duration::minutes(15), id, 0.0, false),
        ];

        let outcome = store.append_batch(&registry, batch);
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.accepted(), 2);
        assert_eq!(outcome.errors().map(|(i, _)| i).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest_for(id).unwrap().timestamp, t0() + Duration::minutes(15));
    }

    #[test]
    fn for_machine_is_newest_first() {
        let (registry, id) = fixture();
        let mut store = TelemetryStore::new();
        for offset in [5, 0, 10] {
            store
                .append(&registry, NewReading::new(t0() + Duration::minutes(offset), id, 1.0, true))
                .unwrap();
        }
        let order: Vec<_> = store.for_machine(id).map(|r| r.timestamp).collect();
        assert_eq!(
            order,
            vec![
                t0() + Duration::minutes(10),
                t0() + Duration::minutes(5),
                t0()
            ]
        );
        assert_eq!(store.count_for(id), 3);
    }
}
