//! `/thresholds` subcommands.

use crate::permissions::Caller;
use crate::service::ModerationService;
use crate::thresholds::{ResetTarget, ThresholdChange, ThresholdName};

use super::reply::{pct, Embed, Reply, COLOR_HISTORY, COLOR_THRESHOLDS};
use super::{report, ThresholdsArgs};

const COMMAND: &str = "thresholds";

/// Trimmed argument, `None` when absent or blank.
fn arg(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub(super) fn handle(service: &ModerationService, tenant: &str, caller: &Caller, args: &ThresholdsArgs) -> Reply {
    match arg(&args.sub).unwrap_or("list") {
        "list" => list(service, tenant),
        "set" => match (arg(&args.threshold), arg(&args.value)) {
            (Some(name), Some(value)) => set(service, tenant, caller, name, value),
            _ => Reply::text("Usage: /thresholds set <Name> <Value>"),
        },
        "reset" => match arg(&args.threshold) {
            Some(target) => reset(service, tenant, caller, target),
            None => Reply::text("Usage: /thresholds reset <Name|all>"),
        },
        "history" => history(service, tenant, arg(&args.threshold), args.limit),
        _ => Reply::text("Unknown subcommand. Use list, set, reset or history."),
    }
}

fn list(service: &ModerationService, tenant: &str) -> Reply {
    let t = match service.resolve_thresholds(tenant) {
        Ok(t) => t,
        Err(e) => return Reply::text(report(&e, COMMAND, tenant)),
    };
    let value = format!(
        "Nudity (Explicit): {}\nNudity (Suggestive): {}\nOffensive: {}\nAI Generated: {}",
        pct(t.nudity_explicit),
        pct(t.nudity_suggestive),
        pct(t.offensive),
        pct(t.ai_generated)
    );
    Reply::embed(
        Embed::new("Detection Thresholds", COLOR_THRESHOLDS)
            .description("Current thresholds to flag image as inappropriate")
            .field("Thresholds", value, false),
    )
}

fn set(service: &ModerationService, tenant: &str, caller: &Caller, name: &str, value: &str) -> Reply {
    match service.set_threshold(tenant, &caller.user_id, name, value) {
        Ok(u) => {
            let mut msg = format!("Set {} to {:.2}%", u.name, u.new_value * 100.0);
            if !u.audited && service.audit_log().is_enabled() {
                msg.push_str(" (the change could not be recorded in the history)");
            }
            Reply::text(msg)
        }
        Err(e) => Reply::text(report(&e, COMMAND, tenant)),
    }
}

fn reset(service: &ModerationService, tenant: &str, caller: &Caller, target: &str) -> Reply {
    let target: ResetTarget = match target.parse() {
        Ok(t) => t,
        Err(e) => return Reply::text(report(&e, COMMAND, tenant)),
    };
    let outcome = match service.reset_threshold(tenant, &caller.user_id, target) {
        Ok(r) => r,
        Err(e) => return Reply::text(report(&e, COMMAND, tenant)),
    };

    if !outcome.is_complete() {
        let failed: Vec<ThresholdName> = outcome.failed.iter().map(|(n, _)| *n).collect();
        return Reply::text(format!(
            "Reset {} to default; failed to reset {}",
            join_names(&outcome.reset_names()),
            join_names(&failed)
        ));
    }

    match target {
        ResetTarget::All => Reply::text("Reset all thresholds to default"),
        ResetTarget::One(name) => Reply::text(format!("Reset {name} to default")),
    }
}

fn history(service: &ModerationService, tenant: &str, filter: Option<&str>, limit: Option<i64>) -> Reply {
    let name = match filter.map(str::parse::<ThresholdName>).transpose() {
        Ok(n) => n,
        Err(e) => return Reply::text(report(&e, COMMAND, tenant)),
    };
    let rows = match service.get_history(tenant, limit, name) {
        Ok(rows) => rows,
        Err(e) => return Reply::text(report(&e, COMMAND, tenant)),
    };

    let scope = if tenant.is_empty() {
        "Recent global threshold changes"
    } else {
        "Recent threshold changes for this server"
    };
    let body = if rows.is_empty() {
        "No threshold changes recorded.".to_string()
    } else {
        rows.iter().map(history_line).collect::<Vec<_>>().join("\n")
    };
    Reply::embed(
        Embed::new("Threshold History", COLOR_HISTORY)
            .description(scope)
            .field("Changes", body, false),
    )
}

/// `` `2026-01-02 10:00 UTC` Offensive: 25% → 40% by <@1> ``
fn history_line(c: &ThresholdChange) -> String {
    let old = c.old_value.map(pct).unwrap_or_else(|| "unset".to_string());
    let actor = c
        .actor_id
        .as_deref()
        .map(|a| format!("<@{a}>"))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "`{}` {}: {} → {} by {}",
        c.created_at.format("%Y-%m-%d %H:%M UTC"),
        c.name,
        old,
        pct(c.new_value),
        actor
    )
}

fn join_names(names: &[ThresholdName]) -> String {
    names
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
