//! # Storage
//! Backend traits for threshold overrides, the audit trail and the role whitelist,
//! plus the implementations selected once at startup:
//!
//! - [`MemoryStore`]: process-lifetime maps, no audit trail.
//! - [`JsonRoleFile`]: role whitelist persisted to a JSON flat file.
//! - [`SqliteStore`]: everything in one SQLite database.
//!
//! Core logic (`ThresholdStore`, `AuditLog`, `PermissionStore`) only sees the traits.

mod json_file;
mod memory;
mod sqlite;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::BotConfig;
use crate::thresholds::{HistoryQuery, NewThresholdChange, ThresholdChange, ThresholdName};

pub use json_file::JsonRoleFile;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Tenant-scoped and global threshold overrides.
pub trait ThresholdBackend: Send + Sync {
    /// Short backend label for logs.
    fn kind(&self) -> &'static str;

    /// Explicitly stored values for one tenant.
    fn tenant_values(&self, tenant_id: &str) -> Result<Vec<(ThresholdName, f64)>>;

    /// Explicitly stored tenant-agnostic values.
    fn global_values(&self) -> Result<Vec<(ThresholdName, f64)>>;

    fn upsert_tenant(&self, tenant_id: &str, name: ThresholdName, value: f64) -> Result<()>;

    fn upsert_global(&self, name: ThresholdName, value: f64) -> Result<()>;
}

/// Append-only threshold change log.
pub trait AuditBackend: Send + Sync {
    /// Store one record; the backend assigns id and timestamp.
    fn append(&self, change: &NewThresholdChange) -> Result<ThresholdChange>;

    /// Newest first, at most `query.limit` rows.
    fn query(&self, query: &HistoryQuery) -> Result<Vec<ThresholdChange>>;
}

/// Per-tenant whitelist of role ids allowed to run restricted commands.
pub trait RoleBackend: Send + Sync {
    fn add_role(&self, tenant_id: &str, role_id: &str) -> Result<()>;

    fn remove_role(&self, tenant_id: &str, role_id: &str) -> Result<()>;

    /// Sorted role ids for a tenant.
    fn list_roles(&self, tenant_id: &str) -> Result<Vec<String>>;
}

/// The backends chosen for this process.
#[derive(Clone)]
pub struct Storage {
    pub thresholds: Arc<dyn ThresholdBackend>,
    pub audit: Option<Arc<dyn AuditBackend>>,
    pub roles: Arc<dyn RoleBackend>,
}

impl Storage {
    /// Everything in memory; no audit trail.
    pub fn in_memory() -> Self {
        let mem = Arc::new(MemoryStore::new());
        Self {
            thresholds: mem.clone(),
            audit: None,
            roles: mem,
        }
    }

    /// Everything in one SQLite store.
    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            thresholds: store.clone(),
            audit: Some(store.clone()),
            roles: store,
        }
    }

    /// Pick backends from configuration: SQLite when a database path is set,
    /// otherwise memory (with roles in a JSON file when one is configured).
    pub fn from_config(cfg: &BotConfig) -> Result<Self> {
        if let Some(path) = &cfg.database_path {
            info!(path = %path.display(), "storage: using sqlite");
            return Ok(Self::sqlite(SqliteStore::open(path)?));
        }

        let mut storage = Self::in_memory();
        if let Some(path) = &cfg.permissions_file {
            info!(path = %path.display(), "storage: roles in json file, thresholds in memory");
            storage.roles = Arc::new(JsonRoleFile::open(path)?);
        } else {
            info!("storage: in memory only, threshold history disabled");
        }
        Ok(storage)
    }
}
