use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use super::{AuditBackend, Result, RoleBackend, StoreError, ThresholdBackend};
use crate::thresholds::{HistoryQuery, HistoryScope, NewThresholdChange, ThresholdChange, ThresholdName};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS thresholds (
    name  TEXT PRIMARY KEY,
    value REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS thresholds_guild (
    guild_id TEXT NOT NULL,
    name     TEXT NOT NULL,
    value    REAL NOT NULL,
    PRIMARY KEY (guild_id, name)
);
CREATE TABLE IF NOT EXISTS thresholds_history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    old_value     REAL NULL,
    new_value     REAL NOT NULL,
    user_id       TEXT NULL,
    guild_id      TEXT NULL,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_thresholds_history_guild
    ON thresholds_history (guild_id, created_at_ms);
CREATE TABLE IF NOT EXISTS permissions (
    guild_id TEXT NOT NULL,
    role_id  TEXT NOT NULL,
    PRIMARY KEY (guild_id, role_id)
);
";

/// SQLite backend for thresholds, audit trail and role whitelist.
///
/// A single connection behind a mutex; writes to the same row serialize on it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and run the DDL.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "opening sqlite store");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    /// In-memory database (tests).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Poisoned("sqlite connection".into()))
    }
}

/// Map `(name, value)` rows, skipping names this build does not know.
fn named_values(rows: Vec<(String, f64)>) -> Vec<(ThresholdName, f64)> {
    rows.into_iter()
        .filter_map(|(name, v)| match name.parse::<ThresholdName>() {
            Ok(n) => Some((n, v)),
            Err(_) => {
                warn!(%name, "skipping unknown threshold row");
                None
            }
        })
        .collect()
}

fn to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn change_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, Option<f64>, f64, Option<String>, Option<String>, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

impl ThresholdBackend for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn tenant_values(&self, tenant_id: &str) -> Result<Vec<(ThresholdName, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, value FROM thresholds_guild WHERE guild_id = ?1")?;
        let rows = stmt
            .query_map([tenant_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(named_values(rows))
    }

    fn global_values(&self) -> Result<Vec<(ThresholdName, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, value FROM thresholds")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(named_values(rows))
    }

    fn upsert_tenant(&self, tenant_id: &str, name: ThresholdName, value: f64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO thresholds_guild (guild_id, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (guild_id, name) DO UPDATE SET value = excluded.value",
            params![tenant_id, name.as_str(), value],
        )?;
        Ok(())
    }

    fn upsert_global(&self, name: ThresholdName, value: f64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO thresholds (name, value) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET value = excluded.value",
            params![name.as_str(), value],
        )?;
        Ok(())
    }
}

impl AuditBackend for SqliteStore {
    fn append(&self, change: &NewThresholdChange) -> Result<ThresholdChange> {
        let conn = self.conn()?;

        // Never go backwards, even if the wall clock does.
        let latest: Option<i64> = conn
            .query_row("SELECT MAX(created_at_ms) FROM thresholds_history", [], |r| r.get(0))
            .optional()?
            .flatten();
        let now = Utc::now().timestamp_millis();
        let created_at_ms = latest.map_or(now, |l| l.max(now));

        conn.execute(
            "INSERT INTO thresholds_history (name, old_value, new_value, user_id, guild_id, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                change.name.as_str(),
                change.old_value,
                change.new_value,
                change.actor_id,
                change.tenant_id,
                created_at_ms,
            ],
        )?;

        Ok(ThresholdChange {
            id: conn.last_insert_rowid(),
            name: change.name,
            old_value: change.old_value,
            new_value: change.new_value,
            actor_id: change.actor_id.clone(),
            tenant_id: change.tenant_id.clone(),
            created_at: to_datetime(created_at_ms),
        })
    }

    fn query(&self, query: &HistoryQuery) -> Result<Vec<ThresholdChange>> {
        let mut sql = String::from(
            "SELECT id, name, old_value, new_value, user_id, guild_id, created_at_ms
             FROM thresholds_history",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        match &query.scope {
            HistoryScope::All => {}
            HistoryScope::Global => clauses.push("guild_id IS NULL"),
            HistoryScope::Tenant(id) => {
                clauses.push("guild_id = ?");
                args.push(Value::Text(id.clone()));
            }
        }
        if let Some(name) = query.name {
            clauses.push("name = ?");
            args.push(Value::Text(name.as_str().to_string()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at_ms DESC, id DESC LIMIT ?");
        args.push(Value::Integer(query.limit as i64));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), change_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, name, old_value, new_value, user_id, guild_id, ms)| {
                let name = match name.parse::<ThresholdName>() {
                    Ok(n) => n,
                    Err(_) => {
                        warn!(id, %name, "skipping history row with unknown threshold");
                        return None;
                    }
                };
                Some(ThresholdChange {
                    id,
                    name,
                    old_value,
                    new_value,
                    actor_id: user_id,
                    tenant_id: guild_id,
                    created_at: to_datetime(ms),
                })
            })
            .collect())
    }
}

impl RoleBackend for SqliteStore {
    fn add_role(&self, tenant_id: &str, role_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO permissions (guild_id, role_id) VALUES (?1, ?2)",
            params![tenant_id, role_id],
        )?;
        Ok(())
    }

    fn remove_role(&self, tenant_id: &str, role_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM permissions WHERE guild_id = ?1 AND role_id = ?2",
            params![tenant_id, role_id],
        )?;
        Ok(())
    }

    fn list_roles(&self, tenant_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT role_id FROM permissions WHERE guild_id = ?1 ORDER BY role_id")?;
        let roles = stmt
            .query_map([tenant_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(roles)
    }
}
