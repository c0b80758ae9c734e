// src/config/mod.rs
//! Process configuration.
//!
//! Layers, later wins:
//! 1) `.env` (loaded into the environment by `dotenvy`)
//! 2) TOML file: `$BOT_CONFIG_PATH`, else `config/bot.toml` if present
//! 3) environment variables

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "BOT_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/bot.toml";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    /// User id allowed to run every command everywhere.
    pub owner_id: Option<String>,
    /// SQLite file; enables persisted thresholds, history and roles.
    pub database_path: Option<PathBuf>,
    /// JSON role whitelist, used when no database is configured.
    pub permissions_file: Option<PathBuf>,
    pub sightengine_user: Option<String>,
    pub sightengine_secret: Option<String>,
    pub sightengine_endpoint: Option<String>,
    pub upstream_timeout: Duration,
    /// Footer shown under every embed.
    pub footer_text: Option<String>,
    pub metrics_enabled: bool,
    pub log_json: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            owner_id: None,
            database_path: None,
            permissions_file: None,
            sightengine_user: None,
            sightengine_secret: None,
            sightengine_endpoint: None,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            footer_text: None,
            metrics_enabled: false,
            log_json: false,
        }
    }
}

/// On-disk shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    owner_id: Option<String>,
    database_path: Option<PathBuf>,
    permissions_file: Option<PathBuf>,
    sightengine_user: Option<String>,
    sightengine_secret: Option<String>,
    sightengine_endpoint: Option<String>,
    upstream_timeout_secs: Option<i64>,
    footer_text: Option<String>,
    metrics_enabled: Option<bool>,
    log_json: Option<bool>,
}

impl BotConfig {
    /// Full load: `.env`, file, environment.
    pub fn load() -> Result<Self> {
        // A missing .env is normal outside local dev; a malformed one is not.
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("loading .env"),
        }
        let mut cfg = match config_file_path()? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(s)?;
        let mut cfg = Self::default();
        cfg.owner_id = non_empty(file.owner_id);
        cfg.database_path = file.database_path.filter(|p| !p.as_os_str().is_empty());
        cfg.permissions_file = file.permissions_file.filter(|p| !p.as_os_str().is_empty());
        cfg.sightengine_user = non_empty(file.sightengine_user);
        cfg.sightengine_secret = non_empty(file.sightengine_secret);
        cfg.sightengine_endpoint = non_empty(file.sightengine_endpoint);
        if let Some(secs) = file.upstream_timeout_secs {
            cfg.upstream_timeout = timeout_from_secs(secs);
        }
        cfg.footer_text = non_empty(file.footer_text);
        cfg.metrics_enabled = file.metrics_enabled.unwrap_or(false);
        cfg.log_json = file.log_json.unwrap_or(false);
        Ok(cfg)
    }

    /// Overlay environment values. Blank variables are ignored.
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| non_empty(get(k));
        if let Some(v) = get("OWNER_ID") {
            self.owner_id = Some(v);
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PERMISSIONS_FILE") {
            self.permissions_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SIGHTENGINE_USER") {
            self.sightengine_user = Some(v);
        }
        if let Some(v) = get("SIGHTENGINE_SECRET") {
            self.sightengine_secret = Some(v);
        }
        if let Some(v) = get("SIGHTENGINE_ENDPOINT") {
            self.sightengine_endpoint = Some(v);
        }
        if let Some(v) = get("UPSTREAM_TIMEOUT_SECS") {
            self.upstream_timeout = timeout_from_secs(v.parse().unwrap_or(0));
        }
        if let Some(v) = get("FOOTER_TEXT") {
            self.footer_text = Some(v);
        }
        if let Some(v) = get("METRICS_ENABLED") {
            self.metrics_enabled = is_truthy(&v);
        }
        if let Some(v) = get("LOG_JSON") {
            self.log_json = is_truthy(&v);
        }
    }
}

/// `$BOT_CONFIG_PATH` must exist when set; the default path is optional.
fn config_file_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_PATH} points to non-existent path {}", pb.display()));
    }
    let default = PathBuf::from(DEFAULT_PATH);
    Ok(default.exists().then_some(default))
}

fn timeout_from_secs(secs: i64) -> Duration {
    if secs > 0 {
        Duration::from_secs(secs as u64)
    } else {
        Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS)
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
