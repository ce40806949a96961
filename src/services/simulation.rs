//! Synthetic fleet history for bootstrapping and tests.
//!
//! The generator walks the window at a fixed step and switches from the
//! "manual" regime to the "optimized" one at a configured offset. All
//! randomness comes from a seeded `SmallRng`, so a plan always yields the same
//! readings and decisions.

use crate::models::{action_types, machine_types, Machine, MachineSpec, NewDecision, NewReading};
use crate::store::TelemetryDb;
use chrono::{DateTime, Duration, Timelike, Utc};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const ACTIVE_FROM_HOUR: u32 = 6;
const ACTIVE_UNTIL_HOUR: u32 = 22;
const DECISIONS_PER_DAY: i64 = 10;
const ON_TEMP_C: (f64, f64) = (23.0, 26.0);
const OFF_TEMP_C: (f64, f64) = (26.0, 29.0);

/// Built-in four-machine building.
pub fn default_fleet() -> Vec<MachineSpec> {
    vec![
        MachineSpec::new("AC-L1", machine_types::LARGE_AC, "Zone A", 45.0),
        MachineSpec::new("AC-L2", machine_types::LARGE_AC, "Zone B", 45.0),
        MachineSpec::new("AC-S1", machine_types::SMALL_AC, "Floor 1", 12.0),
        MachineSpec::new("FAN-01", machine_types::VENTILATION, "Basement", 5.5),
    ]
}

/// Operating behaviour for one part of the simulated window.
#[derive(Debug, Clone, PartialEq)]
pub struct Regime {
    pub name: String,
    /// Multiplier applied to the power draw of a running machine.
    pub efficiency: f64,
    /// Fraction of rated power drawn while on, sampled uniformly.
    pub load_range: (f64, f64),
    /// Chance per sample that a machine of a shed type is switched off
    /// during active hours.
    pub shed_probability: f64,
    pub shed_machine_types: Vec<String>,
    /// Whether the regime logs control decisions.
    pub emits_decisions: bool,
}

impl Regime {
    pub fn manual() -> Self {
        Self {
            name: "manual".to_string(),
            efficiency: 1.0,
            load_range: (0.5, 0.8),
            shed_probability: 0.0,
            shed_machine_types: Vec::new(),
            emits_decisions: false,
        }
    }

    pub fn optimized() -> Self {
        Self {
            name: "optimized".to_string(),
            efficiency: 0.85,
            load_range: (0.5, 0.8),
            shed_probability: 0.2,
            shed_machine_types: vec![machine_types::SMALL_AC.to_string()],
            emits_decisions: true,
        }
    }

    fn validate(&self) -> Result<(), String> {
        let (lo, hi) = self.load_range;
        if !(0.0..=1.0).contains(&self.shed_probability) {
            return Err(format!("regime {}: shed_probability must be within [0, 1]", self.name));
        }
        if !(lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo <= hi) {
            return Err(format!("regime {}: invalid load range {:?}", self.name, self.load_range));
        }
        if !self.efficiency.is_finite() || self.efficiency < 0.0 {
            return Err(format!("regime {}: efficiency must be non-negative", self.name));
        }
        Ok(())
    }

    fn sheds(&self, machine: &Machine) -> bool {
        self.shed_probability > 0.0 && self.shed_machine_types.iter().any(|t| *t == machine.machine_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Duration,
    /// Offset from `start` at which the optimized regime takes over.
    pub split_after: Duration,
    pub manual: Regime,
    pub optimized: Regime,
    pub seed: u64,
}

impl SimulationPlan {
    /// `days` of history ending at `end`, starting on an interval boundary,
    /// switching regimes after `split_days`.
    pub fn ending_at(
        end: DateTime<Utc>,
        days: i64,
        split_days: i64,
        interval: Duration,
        seed: u64,
    ) -> Result<Self, String> {
        let start = Duration::try_days(days)
            .and_then(|d| end.checked_sub_signed(d))
            .ok_or_else(|| format!("simulation window of {} day(s) is out of range", days))?;
        let split_after =
            Duration::try_days(split_days).ok_or_else(|| format!("split of {} day(s) is out of range", split_days))?;
        Ok(Self {
            start: align_to_step(start, interval),
            end,
            interval,
            split_after,
            manual: Regime::manual(),
            optimized: Regime::optimized(),
            seed,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedData {
    pub readings: Vec<NewReading>,
    pub decisions: Vec<NewDecision>,
}

fn align_to_step(ts: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_seconds = step.num_seconds();
    if step_seconds <= 0 {
        return ts;
    }
    let aligned = ts.timestamp().div_euclid(step_seconds) * step_seconds;
    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(ts)
}

fn is_active_hour(hour: u32) -> bool {
    (ACTIVE_FROM_HOUR..=ACTIVE_UNTIL_HOUR).contains(&hour)
}

fn round_to(value: f64, places: i32) -> f64 {
    crate::analytics::round_to(value, places)
}

fn sample_range(rng: &mut SmallRng, (lo, hi): (f64, f64)) -> f64 {
    if lo >= hi { lo } else { rng.random_range(lo..=hi) }
}

/// Produce readings and decisions for every machine of `roster` over the plan's
/// window, both ends inclusive.
pub fn generate(roster: &[Machine], plan: &SimulationPlan) -> Result<SimulatedData, String> {
    if plan.interval <= Duration::zero() {
        return Err("simulation interval must be positive".to_string());
    }
    if plan.start > plan.end {
        return Err("simulation requires start no later than end".to_string());
    }
    plan.manual.validate()?;
    plan.optimized.validate()?;

    let mut rng = SmallRng::seed_from_u64(plan.seed);
    let mut data = SimulatedData::default();
    let mut ts = plan.start;

    while ts <= plan.end {
        let elapsed = ts - plan.start;
        let regime = if elapsed >= plan.split_after {
            &plan.optimized
        } else {
            &plan.manual
        };
        let days_passed = elapsed.num_days();
        let hour = ts.hour();
        let active = is_active_hour(hour);

        for machine in roster {
            let mut is_on = active;
            if is_on && regime.sheds(machine) && rng.random_bool(regime.shed_probability) {
                is_on = false;
            }

            let power_kw = if is_on {
                machine.rated_power_kw * sample_range(&mut rng, regime.load_range) * regime.efficiency
            } else {
                0.0
            };
            let temperature = if is_on {
                sample_range(&mut rng, ON_TEMP_C)
            } else {
                sample_range(&mut rng, OFF_TEMP_C)
            };

            let reading = NewReading::new(ts, machine.id, round_to(power_kw, 2), is_on);
            data.readings.push(reading.with_temperature(round_to(temperature, 1)));

            let cap = usize::try_from(days_passed * DECISIONS_PER_DAY).unwrap_or(0);
            if regime.emits_decisions && data.decisions.len() < cap {
                if hour == ACTIVE_FROM_HOUR && ts.minute() == 0 {
                    data.decisions.push(NewDecision::new(
                        ts,
                        machine.id,
                        action_types::TURN_ON,
                        "Morning startup sequence",
                    ));
                } else if hour == 12 && ts.minute() == 30 && machine.machine_type == machine_types::LARGE_AC {
                    data.decisions.push(NewDecision::new(
                        ts,
                        machine.id,
                        action_types::SET_TEMP,
                        "Peak occupancy, adjusting cooling",
                    ));
                }
            }
        }

        ts += plan.interval;
    }

    debug!(
        "Simulation: {} reading(s), {} decision(s) for {} machine(s)",
        data.readings.len(),
        data.decisions.len(),
        roster.len()
    );
    Ok(data)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub machines: usize,
    pub readings: usize,
    pub decisions: usize,
}

/// Replace the contents of `db` with `roster` and a simulated history.
pub fn seed(db: &TelemetryDb, roster: &[MachineSpec], plan: &SimulationPlan) -> Result<SeedReport, String> {
    info!("Seed: clearing existing data");
    db.clear();

    let mut machines = Vec::with_capacity(roster.len());
    for spec in roster {
        let id = db
            .create_machine(spec.clone())
            .map_err(|e| format!("register {} failed: {}", spec.name, e))?;
        machines.push(db.get_machine(id).map_err(|e| e.to_string())?);
    }

    info!(
        "Seed: generating history from {} to {} (machines={}, step={}min)",
        plan.start,
        plan.end,
        machines.len(),
        plan.interval.num_minutes()
    );
    let data = generate(&machines, plan)?;

    let readings = db.append_readings(data.readings);
    if let Some((index, err)) = readings.errors().next() {
        return Err(format!("simulated reading #{} rejected: {}", index, err));
    }
    let decisions = db.append_decisions(data.decisions);
    if let Some((index, err)) = decisions.errors().next() {
        return Err(format!("simulated decision #{} rejected: {}", index, err));
    }

    let report = SeedReport {
        machines: machines.len(),
        readings: readings.accepted(),
        decisions: decisions.accepted(),
    };
    info!(
        "Seed: complete (machines={}, readings={}, decisions={})",
        report.machines, report.readings, report.decisions
    );
    Ok(report)
}
