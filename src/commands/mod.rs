//! # Command dispatch
//! Structured invocations in, replies out. Every failure is turned into a
//! short user message here; the full error goes to the log.

pub mod reply;
mod thresholds;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::decision::AdvancedAnalysis;
use crate::error::ModerationError;
use crate::permissions::{format_role_list, Caller, PermissionStore};
use crate::service::ModerationService;

pub use reply::{pct, Embed, EmbedField, EmbedFooter, Reply};
use reply::{
    COLOR_ADVANCED, COLOR_AI, COLOR_ANALYSIS, COLOR_HELP, COLOR_PING, COLOR_ROLES, COLOR_ROLE_ADDED,
    COLOR_ROLE_REMOVED,
};

pub const NO_PERMISSION: &str = "You don't have permission to use this command.";
pub const NO_WHITELIST_PERMISSION: &str = "You don't have permission to manage the whitelist.";
pub const MISSING_IMAGE_URL: &str = "Missing `image_url`.";

/// One command invocation as delivered by the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Server id; empty in direct messages.
    #[serde(default)]
    pub tenant_id: String,
    pub caller: Caller,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Analyse {
        #[serde(default)]
        image_url: String,
        #[serde(default)]
        advanced: bool,
    },
    Ai {
        #[serde(default)]
        image_url: String,
    },
    Thresholds(ThresholdsArgs),
    Permissions(PermissionsArgs),
    Ping,
    Help,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Analyse { .. } => "analyse",
            Command::Ai { .. } => "ai",
            Command::Thresholds(_) => "thresholds",
            Command::Permissions(_) => "permissions",
            Command::Ping => "ping",
            Command::Help => "help",
        }
    }

    fn is_restricted(&self) -> bool {
        matches!(
            self,
            Command::Analyse { .. } | Command::Ai { .. } | Command::Thresholds(_)
        )
    }
}

/// `/thresholds [list|set|reset|history]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsArgs {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub threshold: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// `/permissions add|remove|list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionsArgs {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Route one invocation. Never fails.
pub async fn dispatch(service: &ModerationService, perms: &PermissionStore, inv: Invocation) -> Reply {
    let started = Instant::now();
    let tenant = inv.tenant_id.as_str();
    let caller = &inv.caller;
    let name = inv.command.name();

    if inv.command.is_restricted() && !perms.is_allowed_for_restricted(tenant, caller) {
        info!(tenant, user = %caller.user_id, command = name, "command denied");
        return Reply::text(NO_PERMISSION);
    }

    let reply = match &inv.command {
        Command::Analyse { image_url, advanced } => {
            analyse(service, tenant, image_url, *advanced).await
        }
        Command::Ai { image_url } => ai_check(service, tenant, image_url).await,
        Command::Thresholds(args) => thresholds::handle(service, tenant, caller, args),
        Command::Permissions(args) => permissions(perms, tenant, caller, args),
        Command::Ping => ping(started),
        Command::Help => help(),
    };

    info!(
        tenant,
        user = %caller.user_id,
        command = name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "command handled"
    );
    reply
}

/// Log the full error and return the user-facing text.
pub(crate) fn report(err: &ModerationError, command: &str, tenant: &str) -> String {
    match err {
        ModerationError::StoreUnavailable(_) => {
            error!(tenant, command, error = %err, "store failure")
        }
        _ => warn!(tenant, command, error = %err, "command failed"),
    }
    err.user_message()
}

async fn analyse(service: &ModerationService, tenant: &str, image_url: &str, advanced: bool) -> Reply {
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Reply::text(MISSING_IMAGE_URL);
    }

    if advanced {
        return match service.analyse_image_advanced(image_url).await {
            Ok(aa) => Reply::embed(advanced_embed(image_url, &aa)),
            Err(e) => Reply::text(report(&e, "analyse", tenant)),
        };
    }

    match service.analyse_image(tenant, image_url).await {
        Ok(a) => {
            let s = &a.scores;
            let results = format!(
                "Nudity (Explicit): {}\nNudity (Suggestive): {}\nOffensive: {}\nAI Generated: {}",
                pct(s.nudity_explicit),
                pct(s.nudity_suggestive),
                pct(s.offensive),
                pct(s.ai_generated)
            );
            let mut embed = Embed::new("Image Analysis", COLOR_ANALYSIS)
                .description(format!("Analysis results for: {image_url}"))
                .field("Safe Image", a.allowed.to_string(), true)
                .field("Results", results, false);
            if !a.reasons.is_empty() {
                let tags: Vec<&str> = a.reasons.iter().map(|r| r.as_str()).collect();
                embed = embed.field("Flagged", tags.join(", "), false);
            }
            Reply::embed(embed)
        }
        Err(e) => Reply::text(report(&e, "analyse", tenant)),
    }
}

fn advanced_embed(image_url: &str, aa: &AdvancedAnalysis) -> Embed {
    let mut embed = Embed::new("Image Analysis (Advanced)", COLOR_ADVANCED)
        .description(format!("Analysis results for: {image_url}"));
    for (category, title) in [
        ("nudity", "Nudity"),
        ("offensive", "Offensive Content"),
        ("type", "AI Usage"),
    ] {
        if !aa.categories.contains_key(category) {
            continue;
        }
        let lines: Vec<String> = aa
            .sorted(category)
            .into_iter()
            .map(|(k, v)| format!("{k}: {}", pct(v)))
            .collect();
        embed = embed.field(title, lines.join("\n"), false);
    }
    if embed.fields.is_empty() {
        embed = embed.field("Scores", "none", false);
    }
    embed
}

async fn ai_check(service: &ModerationService, tenant: &str, image_url: &str) -> Reply {
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Reply::text(MISSING_IMAGE_URL);
    }
    match service.check_ai(tenant, image_url).await {
        Ok(a) => Reply::embed(
            Embed::new("AI Usage Check", COLOR_AI)
                .description(format!("Analysis results for: {image_url}"))
                .field("Safe Image", a.allowed.to_string(), true)
                .field("AI Generated", pct(a.scores.ai_generated), true),
        ),
        Err(ModerationError::UpstreamAnalysis(msg)) => {
            warn!(tenant, command = "ai", error = %msg, "command failed");
            Reply::text(format!("AI check failed: {msg}"))
        }
        Err(e) => Reply::text(report(&e, "ai", tenant)),
    }
}

fn permissions(perms: &PermissionStore, tenant: &str, caller: &Caller, args: &PermissionsArgs) -> Reply {
    if !perms.can_manage(caller) {
        return Reply::text(NO_WHITELIST_PERMISSION);
    }
    if tenant.is_empty() {
        return Reply::text("The role whitelist can only be managed inside a server.");
    }

    let sub = args.sub.as_deref().map(str::trim).unwrap_or_default();
    let role = args.role.as_deref().map(str::trim).unwrap_or_default();

    let (title, description, color) = match sub {
        "" => return Reply::text("Missing subcommand. Use add, remove or list."),
        "add" | "remove" if role.is_empty() => return Reply::text("Missing role."),
        "add" => {
            if let Err(e) = perms.add_role(tenant, role) {
                return Reply::text(report(&e, "permissions", tenant));
            }
            info!(tenant, actor = %caller.user_id, role, "role whitelisted");
            ("Permissions Updated", format!("Added role <@&{role}>"), COLOR_ROLE_ADDED)
        }
        "remove" => {
            if let Err(e) = perms.remove_role(tenant, role) {
                return Reply::text(report(&e, "permissions", tenant));
            }
            info!(tenant, actor = %caller.user_id, role, "role removed from whitelist");
            ("Permissions Updated", format!("Removed role <@&{role}>"), COLOR_ROLE_REMOVED)
        }
        "list" => (
            "Permissions",
            "Roles allowed to use restricted commands".to_string(),
            COLOR_ROLES,
        ),
        _ => return Reply::text("Unknown subcommand."),
    };

    match perms.list_roles(tenant) {
        Ok(roles) => Reply::embed(
            Embed::new(title, color)
                .description(description)
                .field("Allowed Roles", format_role_list(&roles), false),
        ),
        Err(e) => Reply::text(report(&e, "permissions", tenant)),
    }
}

fn ping(started: Instant) -> Reply {
    let ms = started.elapsed().as_millis();
    Reply::embed(Embed::new("Pong!", COLOR_PING).field("Response Time", format!("{ms} ms"), true))
}

fn help() -> Reply {
    Reply::embed(
        Embed::new("Help", COLOR_HELP)
            .description("Available commands")
            .field(
                "/ai",
                "Checks an Image URL for AI usage.\nArguments: `image_url` (required): The Image URL to check",
                false,
            )
            .field(
                "/analyse",
                "Analyses an Image URL for inappropriate content.\nArguments:\n- `image_url` (required): The Image URL to analyse\n- `advanced` (optional): `true` shows detailed category and subcategory scores for nudity, offensive content and AI usage",
                false,
            )
            .field("/help", "Shows this message", false)
            .field("/permissions", "Manage which roles can use moderator-only commands", false)
            .field("/ping", "Displays the bot's response time", false)
            .field(
                "/thresholds",
                "Shows or modifies detection thresholds.\nSubcommands: `list`, `set <Name> <Value>`, `reset <Name|all>`, `history [limit] [threshold]`",
                false,
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invocation_parses_flat_json() {
        let inv: Invocation = serde_json::from_value(json!({
            "tenant_id": "g1",
            "caller": {"user_id": "u1", "roles": ["r1"], "permissions": "8"},
            "command": "analyse",
            "image_url": "https://img",
            "advanced": true
        }))
        .unwrap();
        assert_eq!(inv.tenant_id, "g1");
        assert_eq!(inv.caller.permissions, 8);
        assert_eq!(
            inv.command,
            Command::Analyse {
                image_url: "https://img".into(),
                advanced: true
            }
        );
    }

    #[test]
    fn thresholds_args_are_optional() {
        let inv: Invocation = serde_json::from_value(json!({
            "caller": {"user_id": "u1"},
            "command": "thresholds",
            "sub": "history",
            "limit": 5
        }))
        .unwrap();
        assert!(inv.tenant_id.is_empty());
        match inv.command {
            Command::Thresholds(a) => {
                assert_eq!(a.sub.as_deref(), Some("history"));
                assert_eq!(a.limit, Some(5));
                assert!(a.threshold.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unit_commands_parse() {
        let inv: Invocation =
            serde_json::from_value(json!({"caller": {"user_id": "u"}, "command": "ping"})).unwrap();
        assert_eq!(inv.command, Command::Ping);
        assert!(serde_json::from_value::<Invocation>(json!({"caller": {"user_id": "u"}, "command": "nope"})).is_err());
    }

    #[test]
    fn restricted_set() {
        assert!(Command::Ai { image_url: String::new() }.is_restricted());
        assert!(Command::Thresholds(ThresholdsArgs::default()).is_restricted());
        assert!(!Command::Help.is_restricted());
        assert!(!Command::Permissions(PermissionsArgs::default()).is_restricted());
    }

    #[test]
    fn advanced_embed_sorts_and_skips_missing() {
        let mut aa = AdvancedAnalysis::default();
        aa.categories.insert(
            "type".into(),
            [("ai_generated".to_string(), 0.2), ("photo".to_string(), 0.8)]
                .into_iter()
                .collect(),
        );
        let e = advanced_embed("https://img", &aa);
        assert_eq!(e.fields.len(), 1);
        assert_eq!(e.field_value("AI Usage"), Some("photo: 80%\nai_generated: 20%"));
    }
}
