//! HTTP surface: health probes and the interaction endpoint.
//!
//! The chat gateway (or anything speaking the same JSON) posts an
//! [`Invocation`] to `/interactions` and relays the returned [`Reply`].

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::commands::{dispatch, Invocation, Reply};
use crate::config::BotConfig;
use crate::metrics::Metrics;
use crate::moderation::{build_moderator, DynModerator};
use crate::permissions::PermissionStore;
use crate::service::ModerationService;
use crate::storage::Storage;

pub struct AppState {
    pub service: ModerationService,
    pub permissions: PermissionStore,
    /// Footer put under every embed.
    pub footer: Option<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(storage: &Storage, moderator: DynModerator, owner_id: Option<String>) -> Self {
        Self {
            service: ModerationService::from_storage(storage, moderator),
            permissions: PermissionStore::new(Arc::clone(&storage.roles), owner_id),
            footer: None,
        }
    }

    /// Select backends and the moderation client from configuration.
    pub fn from_config(cfg: &BotConfig) -> anyhow::Result<Self> {
        let storage = Storage::from_config(cfg).context("opening storage")?;
        let moderator = build_moderator(cfg)?;
        info!(
            thresholds = storage.thresholds.kind(),
            audit = storage.audit.is_some(),
            moderator = moderator.provider_name(),
            "state ready"
        );

        let mut state = Self::new(&storage, moderator, cfg.owner_id.clone());
        state.service = state.service.with_upstream_timeout(cfg.upstream_timeout);
        state.footer = cfg.footer_text.clone();
        Ok(state)
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

/// Build the router; `/metrics` is mounted only when a recorder is given.
pub fn create_router(state: SharedState, metrics: Option<&Metrics>) -> Router {
    let mut router = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/interactions", post(interactions))
        .with_state(state);

    if let Some(m) = metrics {
        router = router.merge(m.router());
    }
    router.layer(CorsLayer::very_permissive())
}

async fn health() -> &'static str {
    "ok"
}

async fn interactions(State(state): State<SharedState>, Json(inv): Json<Invocation>) -> Json<Reply> {
    let reply = dispatch(&state.service, &state.permissions, inv).await;
    Json(reply.with_footer(state.footer.as_deref()))
}
