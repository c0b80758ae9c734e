// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod commands;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod moderation;
pub mod permissions;
pub mod service;
pub mod storage;
pub mod thresholds;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState, SharedState};
pub use crate::config::BotConfig;
pub use crate::decision::{AdvancedAnalysis, Analysis, ReasonKind, Scores};
pub use crate::error::ModerationError;
pub use crate::service::ModerationService;
pub use crate::thresholds::{ThresholdName, Thresholds};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "image_moderation_bot=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Uses `try_init`, so an already-installed subscriber (e.g. the host
/// runtime's) is left in place.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
