use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Result, RoleBackend, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RolesFile {
    #[serde(default)]
    guild_roles: BTreeMap<String, Vec<String>>,
}

/// Role whitelist kept in memory and mirrored to a JSON file after every change.
#[derive(Debug)]
pub struct JsonRoleFile {
    path: PathBuf,
    roles: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl JsonRoleFile {
    /// Load the file if it exists; a missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let parsed = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<RolesFile>(&s)?,
            Err(e) if e.kind() == ErrorKind::NotFound => RolesFile::default(),
            Err(e) => return Err(e.into()),
        };

        let mut roles = BTreeMap::new();
        for (guild, list) in parsed.guild_roles {
            let set: BTreeSet<String> = list
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
            if !set.is_empty() {
                roles.insert(guild, set);
            }
        }
        debug!(path = %path.display(), guilds = roles.len(), "roles file loaded");

        Ok(Self {
            path,
            roles: RwLock::new(roles),
        })
    }

    /// Write via temp file + rename so readers never see a half-written file.
    fn save(&self, roles: &BTreeMap<String, BTreeSet<String>>) -> Result<()> {
        let payload = RolesFile {
            guild_roles: roles
                .iter()
                .map(|(g, set)| (g.clone(), set.iter().cloned().collect()))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&payload)?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to a copy, persist it, and only then publish it.
    /// A failed write leaves the in-memory whitelist untouched.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, BTreeSet<String>>)) -> Result<()> {
        let mut roles = self
            .roles
            .write()
            .map_err(|_| StoreError::Poisoned("roles file".into()))?;
        let mut next = roles.clone();
        change(&mut next);
        self.save(&next)?;
        *roles = next;
        Ok(())
    }
}

impl RoleBackend for JsonRoleFile {
    fn add_role(&self, tenant_id: &str, role_id: &str) -> Result<()> {
        self.update(|roles| {
            roles
                .entry(tenant_id.to_string())
                .or_default()
                .insert(role_id.to_string());
        })
    }

    fn remove_role(&self, tenant_id: &str, role_id: &str) -> Result<()> {
        self.update(|roles| {
            if let Some(set) = roles.get_mut(tenant_id) {
                set.remove(role_id);
                if set.is_empty() {
                    roles.remove(tenant_id);
                }
            }
        })
    }

    fn list_roles(&self, tenant_id: &str) -> Result<Vec<String>> {
        let roles = self
            .roles
            .read()
            .map_err(|_| StoreError::Poisoned("roles file".into()))?;
        Ok(roles
            .get(tenant_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}
