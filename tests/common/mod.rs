// tests/common/mod.rs
//
// Shared fixtures: a canned moderation client and ready-made state.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use image_moderation_bot::moderation::{ImageModerator, ModelSet};
use image_moderation_bot::permissions::Caller;
use image_moderation_bot::storage::{
    AuditBackend, MemoryStore, SqliteStore, Storage, StoreError, ThresholdBackend,
};
use image_moderation_bot::thresholds::{HistoryQuery, NewThresholdChange, ThresholdChange};
use image_moderation_bot::{AppState, ModerationError, ThresholdName};

pub const OWNER: &str = "owner-1";

/// Returns the same document for every call and remembers what was asked.
pub struct StubModerator {
    doc: Result<Value, String>,
    pub calls: Mutex<Vec<(String, ModelSet)>>,
}

impl StubModerator {
    pub fn ok(doc: Value) -> Arc<Self> {
        Arc::new(Self {
            doc: Ok(doc),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            doc: Err(msg.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageModerator for StubModerator {
    async fn check(&self, image_url: &str, models: ModelSet) -> Result<Value, ModerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((image_url.to_string(), models));
        self.doc
            .clone()
            .map_err(ModerationError::UpstreamAnalysis)
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

pub fn sqlite_storage() -> Storage {
    Storage::sqlite(SqliteStore::in_memory().expect("in-memory sqlite"))
}

pub fn state_with(storage: &Storage, moderator: Arc<StubModerator>) -> AppState {
    AppState::new(storage, moderator, Some(OWNER.to_string()))
}

pub fn owner() -> Caller {
    Caller::new(OWNER)
}

pub fn member(roles: &[&str]) -> Caller {
    Caller::new("member-7").with_roles(roles.iter().copied())
}

fn unavailable(what: &str) -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("{what} offline")))
}

/// Threshold backend over a `MemoryStore` that can refuse writes for one
/// name, or refuse everything.
pub struct FlakyThresholds {
    inner: MemoryStore,
    fail_writes_for: Option<ThresholdName>,
    fail_all: bool,
}

impl FlakyThresholds {
    pub fn failing_writes_for(name: ThresholdName) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_writes_for: Some(name),
            fail_all: false,
        })
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_writes_for: None,
            fail_all: true,
        })
    }

    fn check_write(&self, name: ThresholdName) -> Result<(), StoreError> {
        if self.fail_all || self.fail_writes_for == Some(name) {
            return Err(unavailable("threshold table"));
        }
        Ok(())
    }
}

impl ThresholdBackend for FlakyThresholds {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    fn tenant_values(&self, tenant_id: &str) -> Result<Vec<(ThresholdName, f64)>, StoreError> {
        if self.fail_all {
            return Err(unavailable("threshold table"));
        }
        self.inner.tenant_values(tenant_id)
    }

    fn global_values(&self) -> Result<Vec<(ThresholdName, f64)>, StoreError> {
        if self.fail_all {
            return Err(unavailable("threshold table"));
        }
        self.inner.global_values()
    }

    fn upsert_tenant(&self, tenant_id: &str, name: ThresholdName, value: f64) -> Result<(), StoreError> {
        self.check_write(name)?;
        self.inner.upsert_tenant(tenant_id, name, value)
    }

    fn upsert_global(&self, name: ThresholdName, value: f64) -> Result<(), StoreError> {
        self.check_write(name)?;
        self.inner.upsert_global(name, value)
    }
}

/// Audit backend that rejects every append and query.
pub struct BrokenAudit;

impl AuditBackend for BrokenAudit {
    fn append(&self, _change: &NewThresholdChange) -> Result<ThresholdChange, StoreError> {
        Err(unavailable("audit table"))
    }

    fn query(&self, _query: &HistoryQuery) -> Result<Vec<ThresholdChange>, StoreError> {
        Err(unavailable("audit table"))
    }
}

/// Storage with the given threshold and audit backends, roles in memory.
pub fn storage_with(thresholds: Arc<dyn ThresholdBackend>, audit: Option<Arc<dyn AuditBackend>>) -> Storage {
    Storage {
        thresholds,
        audit,
        roles: Arc::new(MemoryStore::new()),
    }
}
