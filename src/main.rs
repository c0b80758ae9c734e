//! Image Moderation Bot: Binary Entrypoint
//! Boots the Axum HTTP server, wiring configuration, storage, and routes.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};

use image_moderation_bot::metrics::Metrics;
use image_moderation_bot::{create_router, init_tracing, AppState, BotConfig};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Also loads .env in local/dev.
    let cfg = BotConfig::load()?;
    init_tracing(cfg.log_json);

    let state = AppState::from_config(&cfg).context("building application state")?;

    let metrics = if cfg.metrics_enabled {
        match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let router = create_router(Arc::new(state), metrics.as_ref());
    info!(metrics = metrics.is_some(), "image moderation bot ready");

    Ok(router.into())
}
