use crate::error::{StoreError, StoreResult};
use crate::models::{Machine, MachineId, MachineSpec};
use std::collections::BTreeMap;

/// The fixed roster of machines. Ids are assigned sequentially and never reused.
///
/// Cascading a delete into readings and decisions is the job of
/// [`crate::store::TelemetryDb`]; this type only owns the machine records.
#[derive(Debug, Clone)]
pub struct MachineRegistry {
    machines: BTreeMap<MachineId, Machine>,
    next_id: i64,
}

impl Default for MachineRegistry {
    fn default() -> Self {
        Self {
            machines: BTreeMap::new(),
            next_id: 1,
        }
    }
}

fn validate_spec(spec: &MachineSpec) -> StoreResult<()> {
    if spec.name.trim().is_empty() {
        return Err(StoreError::validation("machine name must not be empty"));
    }
    if !spec.rated_power_kw.is_finite() || spec.rated_power_kw <= 0.0 {
        return Err(StoreError::validation(format!(
            "rated_power_kw must be positive, got {}",
            spec.rated_power_kw
        )));
    }
    Ok(())
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, spec: MachineSpec) -> StoreResult<MachineId> {
        validate_spec(&spec)?;
        let id = MachineId(self.next_id);
        self.next_id += 1;
        self.machines.insert(id, Machine::from_spec(id, spec));
        Ok(id)
    }

    /// Re-insert a machine with a known id (snapshot restore).
    pub fn restore(&mut self, machine: Machine) -> StoreResult<()> {
        validate_spec(&MachineSpec {
            name: machine.name.clone(),
            machine_type: machine.machine_type.clone(),
            zone: machine.zone.clone(),
            rated_power_kw: machine.rated_power_kw,
        })?;
        if machine.id.0 >= self.next_id {
            self.next_id = machine.id.0 + 1;
        }
        self.machines.insert(machine.id, machine);
        Ok(())
    }

    pub fn get(&self, id: MachineId) -> StoreResult<&Machine> {
        self.machines.get(&id).ok_or(StoreError::NotFound(id))
    }

    pub fn contains(&self, id: MachineId) -> bool {
        self.machines.contains_key(&id)
    }

    /// All machines, ordered by id.
    pub fn list(&self) -> impl Iterator<Item = &Machine> + '_ {
        self.machines.values()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn update(&mut self, id: MachineId, spec: MachineSpec) -> StoreResult<&Machine> {
        validate_spec(&spec)?;
        let slot = self.machines.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        *slot = Machine::from_spec(id, spec);
        Ok(&*slot)
    }

    pub fn delete(&mut self, id: MachineId) -> StoreResult<Machine> {
        self.machines.remove(&id).ok_or(StoreError::NotFound(id))
    }

    pub fn clear(&mut self) {
        self.machines.clear();
    }
}
