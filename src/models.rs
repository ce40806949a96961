//! Domain records held by the registry, the telemetry store and the event log.
//!
//! `New*` structs are what producers submit; the stored variants carry the
//! identifier assigned on append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Useful constants for standardizing `Machine::machine_type` and `Decision::action_type`.
pub mod machine_types {
    pub const LARGE_AC: &str = "Large AC";
    pub const SMALL_AC: &str = "Small AC";
    pub const VENTILATION: &str = "Ventilation";
}

pub mod action_types {
    pub const TURN_ON: &str = "TURN ON";
    pub const TURN_OFF: &str = "TURN OFF";
    pub const SET_TEMP: &str = "SET TEMP";
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub i64);

impl MachineId {
    pub(crate) const MIN: MachineId = MachineId(i64::MIN);
    pub(crate) const MAX: MachineId = MachineId(i64::MAX);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub u64);

/// Provisioning attributes of a machine, as accepted by `create` and `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub name: String,
    pub machine_type: String,
    pub zone: String,
    /// Nameplate capacity; must be positive.
    pub rated_power_kw: f64,
}

impl MachineSpec {
    pub fn new(name: &str, machine_type: &str, zone: &str, rated_power_kw: f64) -> Self {
        Self {
            name: name.to_string(),
            machine_type: machine_type.to_string(),
            zone: zone.to_string(),
            rated_power_kw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub machine_type: String,
    pub zone: String,
    pub rated_power_kw: f64,
}

impl Machine {
    pub(crate) fn from_spec(id: MachineId, spec: MachineSpec) -> Self {
        Self {
            id,
            name: spec.name,
            machine_type: spec.machine_type,
            zone: spec.zone,
            rated_power_kw: spec.rated_power_kw,
        }
    }
}

/// A telemetry sample as submitted by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    pub power_kw: f64,
    pub temperature: Option<f64>,
    pub speed_percent: Option<f64>,
    pub is_on: bool,
}

impl NewReading {
    pub fn new(timestamp: DateTime<Utc>, machine_id: MachineId, power_kw: f64, is_on: bool) -> Self {
        Self {
            timestamp,
            machine_id,
            power_kw,
            temperature: None,
            speed_percent: None,
            is_on,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    pub power_kw: f64,
    pub temperature: Option<f64>,
    pub speed_percent: Option<f64>,
    pub is_on: bool,
}

impl Reading {
    pub(crate) fn from_new(id: ReadingId, new: NewReading) -> Self {
        Self {
            id,
            timestamp: new.timestamp,
            machine_id: new.machine_id,
            power_kw: new.power_kw,
            temperature: new.temperature,
            speed_percent: new.speed_percent,
            is_on: new.is_on,
        }
    }
}

/// A control action as submitted by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecision {
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    pub action_type: String,
    pub reason: String,
}

impl NewDecision {
    pub fn new(timestamp: DateTime<Utc>, machine_id: MachineId, action_type: &str, reason: &str) -> Self {
        Self {
            timestamp,
            machine_id,
            action_type: action_type.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    pub action_type: String,
    pub reason: String,
}

impl Decision {
    pub(crate) fn from_new(id: DecisionId, new: NewDecision) -> Self {
        Self {
            id,
            timestamp: new.timestamp,
            machine_id: new.machine_id,
            action_type: new.action_type,
            reason: new.reason,
        }
    }
}
