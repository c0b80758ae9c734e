//! Moderation API abstraction: a provider trait plus the concrete clients.
//!
//! Callers hold an `Arc<dyn ImageModerator>` so tests can swap in canned
//! responses without any network.

mod sightengine;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::BotConfig;
use crate::error::ModerationError;

pub use sightengine::{SightengineClient, DEFAULT_ENDPOINT};

/// Which detection models to ask the upstream API for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSet {
    /// Nudity, offensive symbols and AI detection.
    Full,
    /// AI detection only.
    AiOnly,
}

impl ModelSet {
    /// Value of the `models` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            ModelSet::Full => "nudity-2.1,offensive-2.0,genai",
            ModelSet::AiOnly => "genai",
        }
    }
}

/// Remote scorer: given an image URL, return the raw JSON document.
#[async_trait]
pub trait ImageModerator: Send + Sync {
    async fn check(&self, image_url: &str, models: ModelSet) -> Result<Value, ModerationError>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynModerator = Arc<dyn ImageModerator>;

/// Used when no credentials are configured. Every call fails.
pub struct DisabledModerator;

pub const MISSING_CREDENTIALS: &str = "SIGHTENGINE_USER and SIGHTENGINE_SECRET must be set";

#[async_trait]
impl ImageModerator for DisabledModerator {
    async fn check(&self, _image_url: &str, _models: ModelSet) -> Result<Value, ModerationError> {
        Err(ModerationError::UpstreamAnalysis(MISSING_CREDENTIALS.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the moderator from configuration; missing credentials give the disabled one.
pub fn build_moderator(cfg: &BotConfig) -> anyhow::Result<DynModerator> {
    match (&cfg.sightengine_user, &cfg.sightengine_secret) {
        (Some(user), Some(secret)) if !user.is_empty() && !secret.is_empty() => {
            let client = SightengineClient::new(user.clone(), secret.clone())?
                .with_endpoint(cfg.sightengine_endpoint.clone())
                .with_timeout(cfg.upstream_timeout);
            Ok(Arc::new(client))
        }
        _ => {
            tracing::warn!("moderation API credentials missing, analysis commands will fail");
            Ok(Arc::new(DisabledModerator))
        }
    }
}
