use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::thresholds::ThresholdName;

pub const ANALYSES_TOTAL: &str = "moderation_analyses_total";
pub const UPSTREAM_ERRORS_TOTAL: &str = "moderation_upstream_errors_total";
pub const THRESHOLD_CHANGES_TOTAL: &str = "threshold_changes_total";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!(ANALYSES_TOTAL, "Completed image analyses by kind and verdict");
        describe_counter!(UPSTREAM_ERRORS_TOTAL, "Failed moderation API calls");
        describe_counter!(THRESHOLD_CHANGES_TOTAL, "Threshold writes (set and reset)");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

// Without an installed recorder these are no-ops.

pub fn record_analysis(kind: &'static str, allowed: Option<bool>) {
    let allowed = match allowed {
        Some(true) => "true",
        Some(false) => "false",
        None => "n/a",
    };
    counter!(ANALYSES_TOTAL, "kind" => kind, "allowed" => allowed).increment(1);
}

pub fn record_upstream_error() {
    counter!(UPSTREAM_ERRORS_TOTAL).increment(1);
}

pub fn record_threshold_change(name: ThresholdName) {
    counter!(THRESHOLD_CHANGES_TOTAL, "name" => name.as_str()).increment(1);
}
