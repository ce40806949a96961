//! In-memory telemetry store for an HVAC fleet: machine registry, time-indexed
//! readings and decisions, building-level aggregations, a seeded simulation
//! and optional TimescaleDB snapshot persistence.

pub mod analytics;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod models;
pub mod registry;
pub mod store;
pub mod telemetry;
pub mod db {
    pub mod models;
    pub mod schema;
}
pub mod services {
    pub mod ingest;
    pub mod simulation;
}

pub use analytics::{BuildingSummary, ComparisonWindow, EnergyComparison, MachineOverview};
pub use config::{AnalyticsConfig, Config};
pub use error::{StoreError, StoreResult};
pub use index::TimeRange;
pub use models::{Decision, DecisionId, Machine, MachineId, MachineSpec, NewDecision, NewReading, Reading, ReadingId};
pub use store::{CascadeReport, TelemetryDb};
pub use telemetry::BatchOutcome;
