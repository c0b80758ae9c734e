use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ImageModerator, ModelSet};
use crate::error::ModerationError;

pub const DEFAULT_ENDPOINT: &str = "https://api.sightengine.com/1.0/check.json";

/// Client for the `check.json` endpoint.
#[derive(Clone)]
pub struct SightengineClient {
    client: Client,
    endpoint: String,
    api_user: String,
    api_secret: String,
    timeout: Duration,
}

impl SightengineClient {
    pub fn new(api_user: String, api_secret: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("image-moderation-bot/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_user,
            api_secret,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(e) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.endpoint = e;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ImageModerator for SightengineClient {
    async fn check(&self, image_url: &str, models: ModelSet) -> Result<Value, ModerationError> {
        let rsp = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .query(&[
                ("url", image_url),
                ("models", models.as_param()),
                ("api_user", self.api_user.as_str()),
                ("api_secret", self.api_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                // reqwest errors embed the full URL including the secret
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                warn!(error = %e.without_url(), "moderation request {kind}");
                ModerationError::UpstreamAnalysis(format!("request {kind}"))
            })?;

        let status = rsp.status();
        let body = rsp.text().await.map_err(|e| {
            ModerationError::UpstreamAnalysis(format!("read response: {}", e.without_url()))
        })?;
        debug!(%status, bytes = body.len(), models = models.as_param(), "moderation response");
        interpret_response(status, &body)
    }

    fn provider_name(&self) -> &'static str {
        "sightengine"
    }
}

/// Longest error body echoed back to users.
const MAX_ERROR_BODY_CHARS: usize = 200;

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

/// Turn status + body into the JSON document or an upstream error.
pub(crate) fn interpret_response(status: StatusCode, body: &str) -> Result<Value, ModerationError> {
    if !status.is_success() {
        return Err(ModerationError::UpstreamAnalysis(format!(
            "unexpected status {}: {}",
            status.as_u16(),
            excerpt(body)
        )));
    }

    let doc: Value = serde_json::from_str(body)
        .map_err(|e| ModerationError::UpstreamAnalysis(format!("decode json: {e}")))?;

    if doc.get("status").and_then(Value::as_str) == Some("failure") {
        let msg = doc
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ModerationError::UpstreamAnalysis(msg.to_string()));
    }
    Ok(doc)
}
