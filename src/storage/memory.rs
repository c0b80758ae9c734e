use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use super::{Result, RoleBackend, StoreError, ThresholdBackend};
use crate::thresholds::ThresholdName;

/// One optional slot per canonical name.
type Slots = [Option<f64>; 4];

fn collect(slots: &Slots) -> Vec<(ThresholdName, f64)> {
    ThresholdName::ALL
        .iter()
        .filter_map(|n| slots[n.index()].map(|v| (*n, v)))
        .collect()
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Poisoned(format!("memory store {what}"))
}

/// In-process backend. Each tenant gets its own lock so tenants never contend
/// once their entry exists; the outer map is only write-locked on first use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tenants: RwLock<HashMap<String, Arc<Mutex<Slots>>>>,
    global: Mutex<Slots>,
    roles: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tenant_slot(&self, tenant_id: &str) -> Result<Option<Arc<Mutex<Slots>>>> {
        let map = self.tenants.read().map_err(|_| poisoned("tenants"))?;
        Ok(map.get(tenant_id).cloned())
    }

    fn tenant_slot_or_insert(&self, tenant_id: &str) -> Result<Arc<Mutex<Slots>>> {
        if let Some(slot) = self.tenant_slot(tenant_id)? {
            return Ok(slot);
        }
        let mut map = self.tenants.write().map_err(|_| poisoned("tenants"))?;
        Ok(map
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new([None; 4])))
            .clone())
    }
}

impl ThresholdBackend for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn tenant_values(&self, tenant_id: &str) -> Result<Vec<(ThresholdName, f64)>> {
        match self.tenant_slot(tenant_id)? {
            Some(slot) => {
                let slots = slot.lock().map_err(|_| poisoned("tenant"))?;
                Ok(collect(&slots))
            }
            None => Ok(Vec::new()),
        }
    }

    fn global_values(&self) -> Result<Vec<(ThresholdName, f64)>> {
        let slots = self.global.lock().map_err(|_| poisoned("global"))?;
        Ok(collect(&slots))
    }

    fn upsert_tenant(&self, tenant_id: &str, name: ThresholdName, value: f64) -> Result<()> {
        let slot = self.tenant_slot_or_insert(tenant_id)?;
        let mut slots = slot.lock().map_err(|_| poisoned("tenant"))?;
        slots[name.index()] = Some(value);
        Ok(())
    }

    fn upsert_global(&self, name: ThresholdName, value: f64) -> Result<()> {
        let mut slots = self.global.lock().map_err(|_| poisoned("global"))?;
        slots[name.index()] = Some(value);
        Ok(())
    }
}

impl RoleBackend for MemoryStore {
    fn add_role(&self, tenant_id: &str, role_id: &str) -> Result<()> {
        let mut map = self.roles.write().map_err(|_| poisoned("roles"))?;
        map.entry(tenant_id.to_string())
            .or_default()
            .insert(role_id.to_string());
        Ok(())
    }

    fn remove_role(&self, tenant_id: &str, role_id: &str) -> Result<()> {
        let mut map = self.roles.write().map_err(|_| poisoned("roles"))?;
        if let Some(set) = map.get_mut(tenant_id) {
            set.remove(role_id);
            if set.is_empty() {
                map.remove(tenant_id);
            }
        }
        Ok(())
    }

    fn list_roles(&self, tenant_id: &str) -> Result<Vec<String>> {
        let map = self.roles.read().map_err(|_| poisoned("roles"))?;
        Ok(map
            .get(tenant_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}
