//! Building-wide aggregations over the telemetry store.
//!
//! Every function here is pure: it reads a consistent view of the store and an
//! explicit `as_of` instant, never the wall clock. Sums are accumulated in index
//! order, so identical data always yields bit-identical results.

use crate::error::{StoreError, StoreResult};
use crate::index::TimeRange;
use crate::models::{Machine, Reading};
use crate::registry::MachineRegistry;
use crate::telemetry::TelemetryStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Round half away from zero to `places` decimal places. Unlike Python's
/// `round()`, exact halves are not rounded to even: `round_to(0.125, 2)` is 0.13.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingSummary {
    pub total_power_kw: f64,
    pub active_machines: usize,
    pub average_temperature: f64,
    /// Every registered machine, including those that never reported.
    pub total_machines: usize,
    /// Machines with at least one reading at or before `as_of`.
    pub reporting_machines: usize,
}

/// Snapshot of the fleet built from each machine's latest reading.
///
/// Machines without readings count towards `total_machines` only. The average
/// temperature is taken over the latest readings that carry a temperature and
/// is 0 when none do.
pub fn building_summary(
    registry: &MachineRegistry,
    readings: &TelemetryStore,
    as_of: DateTime<Utc>,
) -> BuildingSummary {
    let latest: Vec<&Reading> = registry
        .list()
        .filter_map(|m| readings.latest_at(m.id, as_of))
        .collect();

    let total_power: f64 = latest.iter().map(|r| r.power_kw).sum();
    let active_machines = latest.iter().filter(|r| r.is_on).count();
    let temperatures: Vec<f64> = latest.iter().filter_map(|r| r.temperature).collect();
    let average_temperature = if temperatures.is_empty() {
        0.0
    } else {
        temperatures.iter().sum::<f64>() / temperatures.len() as f64
    };

    BuildingSummary {
        total_power_kw: round_to(total_power, 2),
        active_machines,
        average_temperature: round_to(average_temperature, 1),
        total_machines: registry.len(),
        reporting_machines: latest.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyComparison {
    pub window_start: DateTime<Utc>,
    pub split_at: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub manual_period_kwh: f64,
    pub ai_period_kwh: f64,
    pub savings_percent: f64,
    pub manual_readings: usize,
    pub ai_readings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonWindow {
    pub window_days: i64,
    pub split_days: i64,
    pub sample_interval_minutes: f64,
}

impl Default for ComparisonWindow {
    fn default() -> Self {
        Self {
            window_days: 7,
            split_days: 3,
            sample_interval_minutes: 5.0,
        }
    }
}

fn period_energy(readings: &TelemetryStore, range: TimeRange, hours_per_sample: f64) -> StoreResult<(f64, usize)> {
    let (sum, count) = readings
        .range_query(None, range)?
        .fold((0.0_f64, 0_usize), |(sum, count), r| (sum + r.power_kw, count + 1));
    Ok((sum * hours_per_sample, count))
}

/// Resolve `[start, split, as_of]` for `window`, rejecting splits outside the
/// window and windows that reach past the representable date range.
fn comparison_bounds(as_of: DateTime<Utc>, window: ComparisonWindow) -> StoreResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = Duration::try_days(window.window_days).and_then(|d| as_of.checked_sub_signed(d));
    let split_at = start
        .zip(Duration::try_days(window.split_days))
        .and_then(|(start, d)| start.checked_add_signed(d));
    let (Some(start), Some(split_at)) = (start, split_at) else {
        return Err(StoreError::InvalidRange {
            from: as_of,
            to: DateTime::<Utc>::MIN_UTC,
        });
    };
    if window.window_days <= 0 || window.split_days < 0 || window.split_days > window.window_days {
        return Err(StoreError::InvalidRange {
            from: start.max(split_at),
            to: as_of.min(split_at),
        });
    }
    Ok((start, split_at))
}

/// Compare energy use of the manual period `[start, split)` against the AI
/// period `[split, as_of]`, where `start = as_of - window_days` and
/// `split = start + split_days`.
///
/// Energy assumes uniform sampling at `sample_interval_minutes`; gaps in the
/// data are not interpolated. `savings_percent` is 0 when the manual period
/// used no energy.
pub fn energy_comparison(
    readings: &TelemetryStore,
    as_of: DateTime<Utc>,
    window: ComparisonWindow,
) -> StoreResult<EnergyComparison> {
    let (start, split_at) = comparison_bounds(as_of, window)?;
    if !window.sample_interval_minutes.is_finite() || window.sample_interval_minutes <= 0.0 {
        return Err(StoreError::validation(format!(
            "sample interval must be positive, got {} minute(s)",
            window.sample_interval_minutes
        )));
    }

    let hours_per_sample = window.sample_interval_minutes / 60.0;
    let (manual_kwh, manual_readings) =
        period_energy(readings, TimeRange::half_open(start, split_at), hours_per_sample)?;
    let (ai_kwh, ai_readings) = period_energy(readings, TimeRange::inclusive(split_at, as_of), hours_per_sample)?;

    let savings_percent = if manual_kwh > 0.0 {
        round_to((manual_kwh - ai_kwh) / manual_kwh * 100.0, 1)
    } else {
        0.0
    };

    Ok(EnergyComparison {
        window_start: start,
        split_at,
        window_end: as_of,
        manual_period_kwh: round_to(manual_kwh, 2),
        ai_period_kwh: round_to(ai_kwh, 2),
        savings_percent,
        manual_readings,
        ai_readings,
    })
}

/// A machine together with its reading count and most recent reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineOverview {
    #[serde(flatten)]
    pub machine: Machine,
    pub readings_count: usize,
    pub latest_reading: Option<Reading>,
}

pub fn machine_overview(registry: &MachineRegistry, readings: &TelemetryStore) -> Vec<MachineOverview> {
    registry
        .list()
        .map(|m| MachineOverview {
            machine: m.clone(),
            readings_count: readings.count_for(m.id),
            latest_reading: readings.latest_for(m.id).cloned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{machine_types, MachineId, MachineSpec, NewReading};
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap()
    }

    fn fleet() -> (MachineRegistry, Vec<MachineId>) {
        let mut registry = MachineRegistry::new();
        let ids = vec![
            registry
                .create(MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0))
                .unwrap(),
            registry
                .create(MachineSpec::new("AC-S1", machine_types::SMALL_AC, "Floor 1", 12.0))
                .unwrap(),
            registry
                .create(MachineSpec::new("FAN-01", machine_types::VENTILATION, "Basement", 5.5))
                .unwrap(),
        ];
        (registry, ids)
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_to(2.345, 1), 2.3);
        assert_eq!(round_to(12.125, 2), 12.13);
        assert_eq!(round_to(-0.05, 1), -0.1);
        assert_eq!(round_to(0.0, 2), 0.0);
        assert_eq!(round_to(0.125, 2), 0.13);
    }

    #[test]
    fn summary_of_empty_store_is_zero() {
        let (registry, _) = fleet();
        let summary = building_summary(&registry, &TelemetryStore::new(), as_of());
        assert_eq!(
            summary,
            BuildingSummary {
                total_power_kw: 0.0,
                active_machines: 0,
                average_temperature: 0.0,
                total_machines: 3,
                reporting_machines: 0,
            }
        );
    }

    #[test]
    fn summary_uses_latest_reading_per_machine() {
        let (registry, ids) = fleet();
        let mut store = TelemetryStore::new();
        let t = as_of() - Duration::hours(1);

        store
            .append(&registry, NewReading::new(t, ids[0], 10.0, true).with_temperature(30.0))
            .unwrap();
        store
            .append(&registry, NewReading::new(t + Duration::minutes(5), ids[0], 31.123, true).with_temperature(24.0))
            .unwrap();
        store
            .append(&registry, NewReading::new(t, ids[1], 0.0, false).with_temperature(27.0))
            .unwrap();
        // after as_of, must be ignored
        store
            .append(&registry, NewReading::new(as_of() + Duration::minutes(5), ids[1], 9.0, true))
            .unwrap();

        let summary = building_summary(&registry, &store, as_of());
        assert_eq!(summary.total_power_kw, 31.12);
        assert_eq!(summary.active_machines, 1);
        assert_eq!(summary.average_temperature, 25.5);
        assert_eq!(summary.total_machines, 3);
        assert_eq!(summary.reporting_machines, 2);
    }

    #[test]
    fn average_temperature_skips_missing_values() {
        let (registry, ids) = fleet();
        let mut store = TelemetryStore::new();
        let t = as_of() - Duration::minutes(5);
        store
            .append(&registry, NewReading::new(t, ids[0], 20.0, true).with_temperature(24.0))
            .unwrap();
        store.append(&registry, NewReading::new(t, ids[1], 5.0, true)).unwrap();

        let summary = building_summary(&registry, &store, as_of());
        assert_eq!(summary.average_temperature, 24.0);
        assert_eq!(summary.total_power_kw, 25.0);
    }

    #[test]
    fn split_instant_belongs_to_ai_period_only() {
        let (registry, ids) = fleet();
        let mut store = TelemetryStore::new();
        let start = as_of() - Duration::days(7);
        let split = start + Duration::days(3);

        store.append(&registry, NewReading::new(start, ids[0], 12.0, true)).unwrap();
        store
            .append(&registry, NewReading::new(split - Duration::minutes(5), ids[0], 12.0, true))
            .unwrap();
        store.append(&registry, NewReading::new(split, ids[0], 6.0, true)).unwrap();
        store.append(&registry, NewReading::new(as_of(), ids[0], 6.0, true)).unwrap();
        // outside the window on both sides
        store
            .append(&registry, NewReading::new(start - Duration::minutes(5), ids[0], 100.0, true))
            .unwrap();
        store
            .append(&registry, NewReading::new(as_of() + Duration::minutes(5), ids[0], 100.0, true))
            .unwrap();

        let cmp = energy_comparison(&store, as_of(), ComparisonWindow::default()).unwrap();
        assert_eq!(cmp.manual_readings, 2);
        assert_eq!(cmp.ai_readings, 2);
        assert_eq!(cmp.manual_period_kwh, 2.0);
        assert_eq!(cmp.ai_period_kwh, 1.0);
        assert_eq!(cmp.savings_percent, 50.0);
        assert_eq!(cmp.split_at, split);
    }

    #[test]
    fn zero_manual_energy_yields_zero_savings() {
        let (registry, ids) = fleet();
        let mut store = TelemetryStore::new();
        let t0 = as_of() - Duration::hours(2);
        store.append(&registry, NewReading::new(t0, ids[0], 30.0, true)).unwrap();
        store
            .append(&registry, NewReading::new(t0 + Duration::minutes(5), ids[0], 0.0, false))
            .unwrap();

        let cmp = energy_comparison(&store, as_of(), ComparisonWindow::default()).unwrap();
        assert_eq!(cmp.manual_period_kwh, 0.0);
        assert_eq!(cmp.ai_period_kwh, 2.5);
        assert_eq!(cmp.savings_percent, 0.0);
        assert!(cmp.savings_percent.is_finite());

        let empty = energy_comparison(&TelemetryStore::new(), as_of(), ComparisonWindow::default()).unwrap();
        assert_eq!(empty.savings_percent, 0.0);
        assert_eq!(empty.ai_period_kwh, 0.0);
    }

    #[test]
    fn malformed_windows_are_rejected() {
        let store = TelemetryStore::new();
        for (window_days, split_days) in [(0, 0), (7, 8), (7, -1), (-2, 0)] {
            let window = ComparisonWindow {
                window_days,
                split_days,
                ..ComparisonWindow::default()
            };
            assert!(matches!(
                energy_comparison(&store, as_of(), window),
                Err(StoreError::InvalidRange { .. })
            ));
        }

        let bad_interval = ComparisonWindow {
            sample_interval_minutes: 0.0,
            ..ComparisonWindow::default()
        };
        assert!(matches!(
            energy_comparison(&store, as_of(), bad_interval),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn windows_beyond_the_calendar_are_rejected() {
        let store = TelemetryStore::new();
        for (window_days, split_days) in [(100_000_000, 3), (i64::MAX, 0), (7, i64::MAX)] {
            let window = ComparisonWindow {
                window_days,
                split_days,
                ..ComparisonWindow::default()
            };
            assert!(matches!(
                energy_comparison(&store, as_of(), window),
                Err(StoreError::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn overview_counts_readings() {
        let (registry, ids) = fleet();
        let mut store = TelemetryStore::new();
        for minutes in [0, 5, 10] {
            store
                .append(&registry, NewReading::new(as_of() + Duration::minutes(minutes), ids[2], 3.0, true))
                .unwrap();
        }

        let overview = machine_overview(&registry, &store);
        assert_eq!(overview.len(), 3);
        assert_eq!(overview[2].readings_count, 3);
        assert_eq!(
            overview[2].latest_reading.as_ref().map(|r| r.timestamp),
            Some(as_of() + Duration::minutes(10))
        );
        assert_eq!(overview[0].readings_count, 0);
        assert!(overview[0].latest_reading.is_none());
    }
}
