//! Append-only log of control decisions.

use crate::error::{StoreError, StoreResult};
use crate::index::{TimeIndex, TimeRange};
use crate::models::{Decision, DecisionId, MachineId, NewDecision};
use crate::registry::MachineRegistry;
use crate::telemetry::BatchOutcome;
use chrono::{DateTime, Utc};
use log::{debug, warn};

fn validate_decision(registry: &MachineRegistry, decision: &NewDecision) -> StoreResult<()> {
    if !registry.contains(decision.machine_id) {
        return Err(StoreError::validation(format!(
            "decision references unknown machine {}",
            decision.machine_id.0
        )));
    }
    if decision.action_type.trim().is_empty() {
        return Err(StoreError::validation("action_type must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    index: TimeIndex<Decision>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn append(&mut self, registry: &MachineRegistry, decision: NewDecision) -> StoreResult<DecisionId> {
        validate_decision(registry, &decision)?;
        let id = DecisionId(self.index.allocate_seq());
        debug!(
            "Events: decision {} ({}) for machine {} at {}",
            id.0, decision.action_type, decision.machine_id.0, decision.timestamp
        );
        self.index.insert(Decision::from_new(id, decision));
        Ok(id)
    }

    pub fn append_batch(
        &mut self,
        registry: &MachineRegistry,
        decisions: Vec<NewDecision>,
    ) -> BatchOutcome<DecisionId> {
        let results = decisions
            .into_iter()
            .map(|decision| -> StoreResult<DecisionId> {
                validate_decision(registry, &decision)?;
                let id = DecisionId(self.index.allocate_seq());
                self.index.insert(Decision::from_new(id, decision));
                Ok(id)
            })
            .collect::<Vec<_>>();

        let outcome = BatchOutcome { results };
        if outcome.rejected() > 0 {
            warn!(
                "Events: batch accepted {} decision(s), rejected {}",
                outcome.accepted(),
                outcome.rejected()
            );
        }
        outcome
    }

    pub fn restore(&mut self, registry: &MachineRegistry, decision: Decision) -> StoreResult<()> {
        let probe = NewDecision {
            timestamp: decision.timestamp,
            machine_id: decision.machine_id,
            action_type: decision.action_type.clone(),
            reason: String::new(),
        };
        validate_decision(registry, &probe)?;
        self.index.insert(decision);
        Ok(())
    }

    pub fn range_query<'a>(
        &'a self,
        machine: Option<MachineId>,
        range: TimeRange,
    ) -> StoreResult<impl Iterator<Item = &'a Decision> + 'a> {
        self.index.range(machine, range)
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Decision> + '_ {
        self.index.recent(n)
    }

    /// Decisions for one machine, newest first.
    pub fn for_machine(&self, machine: MachineId) -> impl Iterator<Item = &Decision> + '_ {
        self.index.for_machine(machine)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decision> + '_ {
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
