use chrono::{DateTime, Duration, TimeZone, Utc};
use hvac_telemetry::models::{action_types, machine_types};
use hvac_telemetry::services::simulation::{self, SimulationPlan};
use hvac_telemetry::{
    AnalyticsConfig, MachineId, MachineSpec, NewDecision, NewReading, StoreError, TelemetryDb, TimeRange,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap()
}

fn seeded_db() -> TelemetryDb {
    let db = TelemetryDb::new(AnalyticsConfig::default());
    let end = Utc.with_ymd_and_hms(2024, 9, 8, 0, 0, 0).unwrap();
    let plan = SimulationPlan::ending_at(end, 7, 3, Duration::minutes(5), 42).unwrap();
    simulation::seed(&db, &simulation::default_fleet(), &plan).unwrap();
    db
}

#[test]
fn latest_matches_linear_scan() {
    let db = seeded_db();
    let (machines, readings, _) = db.snapshot();
    assert_eq!(machines.len(), 4);
    for machine in &machines {
        let scanned = readings
            .iter()
            .filter(|r| r.machine_id == machine.id)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned();
        assert!(scanned.is_some());
        assert_eq!(db.latest_for(machine.id).unwrap(), scanned);
    }
}

#[test]
fn summary_without_readings_counts_machines_only() {
    let db = TelemetryDb::default();
    for name in ["AC-L1", "AC-L2", "FAN-01"] {
        db.create_machine(MachineSpec::new(name, machine_types::LARGE_AC, "Zone A", 45.0))
            .unwrap();
    }
    let summary = db.building_summary(t0());
    assert_eq!(summary.total_machines, 3);
    assert_eq!(summary.total_power_kw, 0.0);
    assert_eq!(summary.active_machines, 0);
    assert_eq!(summary.average_temperature, 0.0);
}

#[test]
fn two_readings_in_ai_period() {
    let db = TelemetryDb::default();
    let id = db
        .create_machine(MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0))
        .unwrap();
    db.append_reading(NewReading::new(t0(), id, 30.0, true)).unwrap();
    db.append_reading(NewReading::new(t0() + Duration::minutes(5), id, 0.0, false))
        .unwrap();

    let as_of = t0() + Duration::hours(1);
    let cmp = db.energy_comparison(as_of).unwrap();
    assert!(cmp.split_at <= t0());
    assert_eq!(cmp.ai_period_kwh, 2.5);
    assert_eq!(cmp.manual_period_kwh, 0.0);
    assert_eq!(cmp.savings_percent, 0.0);
    assert_eq!(cmp.ai_readings, 2);
    assert_eq!(cmp.manual_readings, 0);
}

#[test]
fn inclusive_range_returns_all_three_in_order() {
    let db = TelemetryDb::default();
    let a = db
        .create_machine(MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0))
        .unwrap();
    let b = db
        .create_machine(MachineSpec::new("AC-S1", machine_types::SMALL_AC, "Floor 1", 12.0))
        .unwrap();
    // appended out of order on purpose
    db.append_reading(NewReading::new(t0() + Duration::minutes(10), a, 3.0, true))
        .unwrap();
    db.append_reading(NewReading::new(t0(), b, 1.0, true)).unwrap();
    db.append_reading(NewReading::new(t0() + Duration::minutes(5), a, 2.0, true))
        .unwrap();

    let rows = db
        .range_readings(None, TimeRange::inclusive(t0(), t0() + Duration::minutes(10)))
        .unwrap();
    let stamps: Vec<_> = rows.iter().map(|r| r.timestamp).collect();
    assert_eq!(
        stamps,
        vec![t0(), t0() + Duration::minutes(5), t0() + Duration::minutes(10)]
    );

    let reversed = db.range_readings(None, TimeRange::inclusive(t0() + Duration::minutes(10), t0()));
    assert!(matches!(reversed, Err(StoreError::InvalidRange { .. })));
}

#[test]
fn deleted_machine_disappears_from_every_view() {
    let db = seeded_db();
    let victim = db.list_machines()[0].id;
    assert!(db.readings_for(victim).unwrap().len() > 0);

    let report = db.delete_machine(victim).unwrap();
    assert!(report.readings_removed > 0);

    assert!(db.list_machines().iter().all(|m| m.id != victim));
    let window = TimeRange::inclusive(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(), Utc::now());
    assert!(db.range_readings(None, window).unwrap().iter().all(|r| r.machine_id != victim));
    assert!(db.range_decisions(None, window).unwrap().iter().all(|d| d.machine_id != victim));
    assert!(db.recent_readings(10_000).iter().all(|r| r.machine_id != victim));
    assert!(db.recent_decisions(10_000).iter().all(|d| d.machine_id != victim));
    assert!(db.machine_overview().iter().all(|o| o.machine.id != victim));
}

#[test]
fn identical_batches_give_identical_results() {
    let build = || {
        let db = TelemetryDb::default();
        let id = db
            .create_machine(MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0))
            .unwrap();
        let batch: Vec<_> = (0..12)
            .map(|i| NewReading::new(t0() + Duration::minutes(5 * (i % 4)), id, i as f64, i % 2 == 0))
            .collect();
        db.append_readings(batch.clone());
        db.append_readings(batch);
        db
    };
    let (left, right) = (build(), build());
    let window = TimeRange::inclusive(t0(), t0() + Duration::minutes(15));
    let l = left.range_readings(None, window).unwrap();
    let r = right.range_readings(None, window).unwrap();
    assert_eq!(l.len(), 24);
    assert_eq!(l, r);
}

#[test]
fn batch_reports_each_rejected_item() {
    let db = TelemetryDb::default();
    let id = db
        .create_machine(MachineSpec::new("FAN-01", machine_types::VENTILATION, "Basement", 5.5))
        .unwrap();
    let outcome = db.append_readings(vec![
        NewReading::new(t0(), id, 1.0, true),
        NewReading::new(t0(), MachineId(77), 1.0, true),
        NewReading::new(t0(), id, -4.0, true),
    ]);
    assert_eq!(outcome.accepted(), 1);
    assert_eq!(outcome.rejected(), 2);
    let bad: Vec<_> = outcome.errors().map(|(i, _)| i).collect();
    assert_eq!(bad, vec![1, 2]);
    assert_eq!(db.reading_count(), 1);
}

#[test]
fn purge_drops_only_older_readings() {
    let db = TelemetryDb::default();
    let id = db
        .create_machine(MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0))
        .unwrap();
    for i in 0..6 {
        db.append_reading(NewReading::new(t0() + Duration::minutes(5 * i), id, 1.0, true))
            .unwrap();
    }
    assert_eq!(db.purge_readings_before(t0() + Duration::minutes(10)), 2);
    assert_eq!(db.reading_count(), 4);
    let oldest = db.readings_for(id).unwrap().last().map(|r| r.timestamp);
    assert_eq!(oldest, Some(t0() + Duration::minutes(10)));
}

#[test]
fn cascade_delete_during_appends_leaves_no_orphans() {
    let db = TelemetryDb::default();
    let ids: Vec<MachineId> = (0..4)
        .map(|i| {
            db.create_machine(MachineSpec::new(&format!("AC-{}", i), machine_types::SMALL_AC, "Floor 1", 12.0))
                .unwrap()
        })
        .collect();

    std::thread::scope(|s| {
        for &id in &ids {
            let db = &db;
            s.spawn(move || {
                for i in 0..500 {
                    let ts = t0() + Duration::minutes(i);
                    // appends start failing once the machine is gone
                    let _ = db.append_reading(NewReading::new(ts, id, 2.0, true));
                    if i % 50 == 0 {
                        let _ = db.append_decision(NewDecision::new(ts, id, action_types::SET_TEMP, "Load"));
                    }
                }
            });
        }
        let db = &db;
        let doomed = [ids[1], ids[3]];
        s.spawn(move || {
            for id in doomed {
                std::thread::yield_now();
                db.delete_machine(id).unwrap();
            }
        });
    });

    let (machines, readings, decisions) = db.snapshot();
    assert_eq!(machines.len(), 2);
    let live: Vec<MachineId> = machines.iter().map(|m| m.id).collect();
    assert!(readings.iter().all(|r| live.contains(&r.machine_id)));
    assert!(decisions.iter().all(|d| live.contains(&d.machine_id)));
    assert_eq!(readings.len(), 1000);
}
