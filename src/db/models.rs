//! Diesel row structs mirroring the persisted layout of the fleet.
//!
//! Important: Migrations set up TimescaleDB hypertables for `readings` and
//! `decisions`. Ids are assigned by the in-memory store and persisted as-is.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema;
use crate::models::{Decision, DecisionId, Machine, MachineId, Reading, ReadingId};

fn to_db_id(kind: &str, id: u64) -> Result<i64, String> {
    i64::try_from(id).map_err(|_| format!("{} id {} does not fit in BIGINT", kind, id))
}

fn from_db_id(kind: &str, id: i64) -> Result<u64, String> {
    u64::try_from(id).map_err(|_| format!("{} id {} is negative", kind, id))
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::machines)]
pub struct MachineRow {
    pub id: i64,
    pub name: String,
    pub machine_type: String,
    pub zone: String,
    pub rated_power_kw: f64,
}

impl From<&Machine> for MachineRow {
    fn from(m: &Machine) -> Self {
        MachineRow {
            id: m.id.0,
            name: m.name.clone(),
            machine_type: m.machine_type.clone(),
            zone: m.zone.clone(),
            rated_power_kw: m.rated_power_kw,
        }
    }
}

impl From<MachineRow> for Machine {
    fn from(row: MachineRow) -> Self {
        Machine {
            id: MachineId(row.id),
            name: row.name,
            machine_type: row.machine_type,
            zone: row.zone,
            rated_power_kw: row.rated_power_kw,
        }
    }
}

// Hypertable: readings
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::readings)]
pub struct ReadingRow {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub machine_id: i64,
    pub power_kw: f64,
    pub temperature: Option<f64>,
    pub speed_percent: Option<f64>,
    pub is_on: bool,
}

impl ReadingRow {
    pub fn from_reading(r: &Reading) -> Result<Self, String> {
        Ok(ReadingRow {
            id: to_db_id("reading", r.id.0)?,
            time: r.timestamp,
            machine_id: r.machine_id.0,
            power_kw: r.power_kw,
            temperature: r.temperature,
            speed_percent: r.speed_percent,
            is_on: r.is_on,
        })
    }

    pub fn into_reading(self) -> Result<Reading, String> {
        Ok(Reading {
            id: ReadingId(from_db_id("reading", self.id)?),
            timestamp: self.time,
            machine_id: MachineId(self.machine_id),
            power_kw: self.power_kw,
            temperature: self.temperature,
            speed_percent: self.speed_percent,
            is_on: self.is_on,
        })
    }
}

// Hypertable: decisions
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::decisions)]
pub struct DecisionRow {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub machine_id: i64,
    pub action_type: String,
    pub reason: String,
}

impl DecisionRow {
    pub fn from_decision(d: &Decision) -> Result<Self, String> {
        Ok(DecisionRow {
            id: to_db_id("decision", d.id.0)?,
            time: d.timestamp,
            machine_id: d.machine_id.0,
            action_type: d.action_type.clone(),
            reason: d.reason.clone(),
        })
    }

    pub fn into_decision(self) -> Result<Decision, String> {
        Ok(Decision {
            id: DecisionId(from_db_id("decision", self.id)?),
            timestamp: self.time,
            machine_id: MachineId(self.machine_id),
            action_type: self.action_type,
            reason: self.reason,
        })
    }
}
