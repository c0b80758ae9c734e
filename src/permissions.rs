//! Access control for restricted commands: owner, server admins, and a
//! per-server whitelist of role ids.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::ModerationError;
use crate::storage::RoleBackend;

/// Discord permission bits that count as "server admin".
pub const PERM_ADMINISTRATOR: u64 = 1 << 3;
pub const PERM_MANAGE_GUILD: u64 = 1 << 5;

/// Who invoked a command, as seen in that tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission bit field for this context. Accepts a number or a decimal string.
    #[serde(default, deserialize_with = "permission_bits")]
    pub permissions: u64,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions(mut self, bits: u64) -> Self {
        self.permissions = bits;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.permissions & (PERM_ADMINISTRATOR | PERM_MANAGE_GUILD) != 0
    }
}

fn permission_bits<'de, D>(de: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Bits {
        Num(u64),
        Text(String),
    }
    match Bits::deserialize(de)? {
        Bits::Num(n) => Ok(n),
        Bits::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Clone)]
pub struct PermissionStore {
    backend: Arc<dyn RoleBackend>,
    owner_id: Option<String>,
}

impl PermissionStore {
    pub fn new(backend: Arc<dyn RoleBackend>, owner_id: Option<String>) -> Self {
        let owner_id = owner_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self { backend, owner_id }
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }

    /// May run `analyse`, `ai` and `thresholds`.
    ///
    /// DMs (empty tenant): owner only. In a tenant: owner, admin, or a member
    /// holding a whitelisted role. A role lookup failure denies.
    pub fn is_allowed_for_restricted(&self, tenant_id: &str, caller: &Caller) -> bool {
        if tenant_id.is_empty() {
            return self.is_owner(&caller.user_id);
        }
        if self.is_owner(&caller.user_id) || caller.is_admin() {
            return true;
        }
        if caller.roles.is_empty() {
            return false;
        }

        let allowed = match self.backend.list_roles(tenant_id) {
            Ok(roles) => roles,
            Err(e) => {
                warn!(tenant = tenant_id, error = %e, "role whitelist unavailable, denying");
                return false;
            }
        };
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        let ok = caller.roles.iter().any(|r| allowed.contains(r.as_str()));
        debug!(tenant = tenant_id, user = %caller.user_id, ok, "role check");
        ok
    }

    /// May edit the whitelist.
    pub fn can_manage(&self, caller: &Caller) -> bool {
        self.is_owner(&caller.user_id) || caller.is_admin()
    }

    pub fn add_role(&self, tenant_id: &str, role_id: &str) -> Result<(), ModerationError> {
        Ok(self.backend.add_role(tenant_id, role_id.trim())?)
    }

    pub fn remove_role(&self, tenant_id: &str, role_id: &str) -> Result<(), ModerationError> {
        Ok(self.backend.remove_role(tenant_id, role_id.trim())?)
    }

    pub fn list_roles(&self, tenant_id: &str) -> Result<Vec<String>, ModerationError> {
        Ok(self.backend.list_roles(tenant_id)?)
    }
}

/// Role ids as mentions: `<@&1>, <@&2>`.
pub fn format_role_list(role_ids: &[String]) -> String {
    let mentions: Vec<String> = role_ids
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| format!("<@&{r}>"))
        .collect();
    if mentions.is_empty() {
        "(none configured)".to_string()
    } else {
        mentions.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> PermissionStore {
        PermissionStore::new(Arc::new(MemoryStore::new()), Some(" 42 ".into()))
    }

    #[test]
    fn dm_is_owner_only() {
        let p = store();
        assert!(p.is_allowed_for_restricted("", &Caller::new("42")));
        let admin = Caller::new("7").with_permissions(PERM_ADMINISTRATOR);
        assert!(!p.is_allowed_for_restricted("", &admin));
    }

    #[test]
    fn owner_and_admins_pass_in_tenant() {
        let p = store();
        assert!(p.is_allowed_for_restricted("g1", &Caller::new("42")));
        assert!(p.is_allowed_for_restricted("g1", &Caller::new("7").with_permissions(PERM_MANAGE_GUILD)));
        assert!(!p.is_allowed_for_restricted("g1", &Caller::new("7").with_permissions(1 << 11)));
    }

    #[test]
    fn whitelisted_role_passes_only_in_its_tenant() {
        let p = store();
        p.add_role("g1", "mod").unwrap();
        let member = Caller::new("7").with_roles(["everyone", "mod"]);
        assert!(p.is_allowed_for_restricted("g1", &member));
        assert!(!p.is_allowed_for_restricted("g2", &member));

        p.remove_role("g1", "mod").unwrap();
        assert!(!p.is_allowed_for_restricted("g1", &member));
    }

    #[test]
    fn no_owner_configured() {
        let p = PermissionStore::new(Arc::new(MemoryStore::new()), Some("  ".into()));
        assert!(!p.is_owner(""));
        assert!(!p.is_allowed_for_restricted("", &Caller::new("")));
    }

    #[test]
    fn management_requires_owner_or_admin() {
        let p = store();
        assert!(p.can_manage(&Caller::new("42")));
        assert!(p.can_manage(&Caller::new("1").with_permissions(PERM_ADMINISTRATOR)));
        assert!(!p.can_manage(&Caller::new("1").with_roles(["mod"])));
    }

    #[test]
    fn role_list_formatting() {
        assert_eq!(format_role_list(&[]), "(none configured)");
        assert_eq!(format_role_list(&[" ".into()]), "(none configured)");
        assert_eq!(format_role_list(&["1".into(), "2".into()]), "<@&1>, <@&2>");
    }

    #[test]
    fn caller_permissions_accept_string_bits() {
        let c: Caller = serde_json::from_str(r#"{"user_id":"1","permissions":"40"}"#).unwrap();
        assert_eq!(c.permissions, 40);
        assert!(c.is_admin());
        let c: Caller = serde_json::from_str(r#"{"user_id":"1"}"#).unwrap();
        assert_eq!(c.permissions, 0);
        assert!(c.roles.is_empty());
    }
}
