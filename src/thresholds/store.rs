//! Per-tenant threshold resolution and writes.
//!
//! Resolution per name: tenant value (if stored) → global value (if stored) →
//! compiled default. A stored tenant value wins even when it equals the default,
//! so a tenant that was reset is not silently re-pointed at a global override.
//! The empty tenant id resolves to defaults without touching the backend.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{validate_range, ResetTarget, ThresholdName, Thresholds};
use crate::error::ModerationError;
use crate::storage::ThresholdBackend;

#[derive(Clone)]
pub struct ThresholdStore {
    backend: Arc<dyn ThresholdBackend>,
}

/// Outcome of resetting one or more names. Each name is attempted independently;
/// `reset` holds whatever the per-name step returned.
#[derive(Debug)]
pub struct ResetOutcome<T = ThresholdName> {
    pub reset: Vec<T>,
    pub failed: Vec<(ThresholdName, ModerationError)>,
}

impl<T> Default for ResetOutcome<T> {
    fn default() -> Self {
        Self {
            reset: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl ThresholdStore {
    pub fn new(backend: Arc<dyn ThresholdBackend>) -> Self {
        Self { backend }
    }

    /// Effective thresholds for a tenant.
    pub fn resolve(&self, tenant_id: &str) -> Result<Thresholds, ModerationError> {
        let mut out = Thresholds::default();
        if tenant_id.is_empty() {
            return Ok(out);
        }

        let tenant = self.backend.tenant_values(tenant_id)?;
        let global = self.backend.global_values()?;

        for name in ThresholdName::ALL {
            let value = lookup(&tenant, name)
                .or_else(|| lookup(&global, name))
                .unwrap_or_else(|| name.default_value());
            out.set(name, value);
        }
        debug!(tenant = tenant_id, thresholds = ?out.as_tuple(), "resolved thresholds");
        Ok(out)
    }

    /// `(suggestive, explicit, offensive, ai)` for a tenant.
    pub fn get_effective(&self, tenant_id: &str) -> Result<(f64, f64, f64, f64), ModerationError> {
        self.resolve(tenant_id).map(|t| t.as_tuple())
    }

    /// Value stored for exactly this scope, ignoring fallbacks.
    /// The empty tenant id reads the global scope.
    pub fn explicit_value(
        &self,
        tenant_id: &str,
        name: ThresholdName,
    ) -> Result<Option<f64>, ModerationError> {
        let values = if tenant_id.is_empty() {
            self.backend.global_values()?
        } else {
            self.backend.tenant_values(tenant_id)?
        };
        Ok(lookup(&values, name))
    }

    /// Validate `name` and write `value` for the tenant (empty id = global scope).
    ///
    /// Does not write an audit record.
    pub fn set(&self, tenant_id: &str, name: &str, value: f64) -> Result<ThresholdName, ModerationError> {
        let name: ThresholdName = name.parse()?;
        self.set_named(tenant_id, name, value)?;
        Ok(name)
    }

    pub fn set_named(
        &self,
        tenant_id: &str,
        name: ThresholdName,
        value: f64,
    ) -> Result<(), ModerationError> {
        let value = validate_range(value)?;
        if tenant_id.is_empty() {
            self.backend.upsert_global(name, value)?;
        } else {
            self.backend.upsert_tenant(tenant_id, name, value)?;
        }
        debug!(tenant = tenant_id, threshold = %name, value, "threshold written");
        Ok(())
    }

    /// Write the compiled default for one name.
    pub fn reset_one(&self, tenant_id: &str, name: ThresholdName) -> Result<(), ModerationError> {
        self.set_named(tenant_id, name, name.default_value())
    }

    /// Reset every name; a failure on one does not stop or undo the others.
    pub fn reset_all(&self, tenant_id: &str) -> ResetOutcome {
        self.reset(tenant_id, ResetTarget::All)
    }

    pub fn reset(&self, tenant_id: &str, target: ResetTarget) -> ResetOutcome {
        self.reset_with(tenant_id, target, |name| self.reset_one(tenant_id, name).map(|()| name))
    }

    /// Best-effort loop behind every reset: `apply` runs once per target name,
    /// failures are logged and collected, and the loop always finishes.
    pub fn reset_with<T>(
        &self,
        tenant_id: &str,
        target: ResetTarget,
        mut apply: impl FnMut(ThresholdName) -> Result<T, ModerationError>,
    ) -> ResetOutcome<T> {
        let names: &[ThresholdName] = match &target {
            ResetTarget::One(n) => std::slice::from_ref(n),
            ResetTarget::All => &ThresholdName::ALL,
        };
        let mut outcome = ResetOutcome::default();
        for &name in names {
            match apply(name) {
                Ok(v) => outcome.reset.push(v),
                Err(e) => {
                    warn!(tenant = tenant_id, threshold = %name, error = %e, "threshold reset failed");
                    outcome.failed.push((name, e));
                }
            }
        }
        outcome
    }
}

fn lookup(values: &[(ThresholdName, f64)], name: ThresholdName) -> Option<f64> {
    values.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> ThresholdStore {
        ThresholdStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn unknown_tenant_gets_defaults() {
        let s = store();
        assert_eq!(s.get_effective("nobody").unwrap(), (0.75, 0.25, 0.25, 0.60));
    }

    #[test]
    fn set_only_touches_one_name() {
        let s = store();
        s.set("g", "Offensive", 0.5).unwrap();
        assert_eq!(s.get_effective("g").unwrap(), (0.75, 0.25, 0.5, 0.60));
    }

    #[test]
    fn set_rejects_unknown_name_and_range() {
        let s = store();
        assert!(matches!(
            s.set("g", "Violence", 0.5),
            Err(ModerationError::UnknownThreshold { .. })
        ));
        assert!(matches!(
            s.set("g", "Offensive", 1.5),
            Err(ModerationError::Range { .. })
        ));
        assert_eq!(s.resolve("g").unwrap(), Thresholds::default());
    }

    #[test]
    fn global_fills_gaps_but_tenant_wins() {
        let s = store();
        s.set("", "Offensive", 0.1).unwrap();
        s.set("", "AIGenerated", 0.9).unwrap();
        s.set("g", "AIGenerated", 0.6).unwrap();

        let t = s.resolve("g").unwrap();
        assert_eq!(t.offensive, 0.1);
        // Explicit tenant value equal to the default still beats the global one.
        assert_eq!(t.ai_generated, 0.6);
        // Empty tenant never consults storage.
        assert_eq!(s.resolve("").unwrap(), Thresholds::default());
    }

    #[test]
    fn reset_all_writes_defaults() {
        let s = store();
        s.set("", "NudityExplicit", 0.9).unwrap();
        s.set("g", "NudityExplicit", 0.8).unwrap();
        let out = s.reset_all("g");
        assert_eq!(out.reset.len(), 4);
        assert!(out.failed.is_empty());
        assert_eq!(s.resolve("g").unwrap(), Thresholds::default());
        assert_eq!(
            s.explicit_value("g", ThresholdName::NudityExplicit).unwrap(),
            Some(0.25)
        );
    }
}
