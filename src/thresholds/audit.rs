//! Append-only record of threshold changes.
//!
//! Without an audit-capable backend every call degrades silently: `record`
//! succeeds with nothing stored and `history` returns an empty list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ThresholdName;
use crate::error::ModerationError;
use crate::storage::AuditBackend;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// One stored change. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChange {
    pub id: i64,
    pub name: ThresholdName,
    pub old_value: Option<f64>,
    pub new_value: f64,
    pub actor_id: Option<String>,
    /// `None` for a global-scope change.
    pub tenant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A change before the backend assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewThresholdChange {
    pub name: ThresholdName,
    pub old_value: Option<f64>,
    pub new_value: f64,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// Which records a history query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    /// Every record regardless of tenant.
    All,
    /// Records with a null tenant.
    Global,
    Tenant(String),
}

impl HistoryScope {
    /// Empty tenant id maps to the global scope.
    pub fn for_tenant(tenant_id: &str) -> Self {
        if tenant_id.is_empty() {
            HistoryScope::Global
        } else {
            HistoryScope::Tenant(tenant_id.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub scope: HistoryScope,
    pub name: Option<ThresholdName>,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn new(scope: HistoryScope, limit: Option<i64>, name: Option<ThresholdName>) -> Self {
        Self {
            scope,
            name,
            limit: clamp_limit(limit),
        }
    }
}

/// Values outside `(0, 100]` fall back to the default rather than erroring.
pub fn clamp_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 && n <= MAX_HISTORY_LIMIT as i64 => n as usize,
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

fn none_if_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Clone, Default)]
pub struct AuditLog {
    backend: Option<Arc<dyn AuditBackend>>,
}

impl AuditLog {
    pub fn new(backend: Option<Arc<dyn AuditBackend>>) -> Self {
        Self { backend }
    }

    /// A log that stores nothing.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Append one record. Empty actor or tenant ids are stored as null.
    ///
    /// Returns `Ok(None)` when no backend is configured.
    pub fn record(
        &self,
        name: ThresholdName,
        old_value: Option<f64>,
        new_value: f64,
        actor_id: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Result<Option<ThresholdChange>, ModerationError> {
        let Some(backend) = &self.backend else {
            debug!(threshold = %name, "audit disabled, change not recorded");
            return Ok(None);
        };
        let change = NewThresholdChange {
            name,
            old_value,
            new_value,
            actor_id: none_if_empty(actor_id),
            tenant_id: none_if_empty(tenant_id),
        };
        Ok(Some(backend.append(&change)?))
    }

    /// Newest first, bounded by the clamped limit.
    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<ThresholdChange>, ModerationError> {
        match &self.backend {
            Some(backend) => Ok(backend.query(query)?),
            None => Ok(Vec::new()),
        }
    }

    /// History for one tenant (empty id = global scope).
    pub fn history_for(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
        name: Option<ThresholdName>,
    ) -> Result<Vec<ThresholdChange>, ModerationError> {
        self.history(&HistoryQuery::new(
            HistoryScope::for_tenant(tenant_id),
            limit,
            name,
        ))
    }
}
