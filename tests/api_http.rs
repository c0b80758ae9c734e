// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET / , /health, /healthz
// - POST /interactions (analyse, thresholds set/list, permission denial, bad body)

mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use common::{sqlite_storage, state_with, StubModerator, OWNER};
use image_moderation_bot::create_router;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(doc: Value) -> Router {
    let storage = sqlite_storage();
    let state = state_with(&storage, StubModerator::ok(doc)).with_footer("Image Moderation");
    create_router(Arc::new(state), None)
}

async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/interactions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST /interactions");
    let resp = app.oneshot(req).await.expect("oneshot /interactions");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, v)
}

#[tokio::test]
async fn health_endpoints_return_ok() {
    for uri in ["/", "/health", "/healthz"] {
        let app = test_router(json!({}));
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
    }
}

#[tokio::test]
async fn metrics_route_absent_when_disabled() {
    let app = test_router(json!({}));
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analyse_returns_embed_with_footer() {
    let app = test_router(json!({
        "nudity": {"sexual_activity": 0.9},
        "offensive": {},
        "type": {"ai_generated": 0.1}
    }));
    let (status, v) = post_json(
        app,
        json!({
            "tenant_id": "guild-1",
            "caller": {"user_id": OWNER},
            "command": "analyse",
            "image_url": "https://cdn.example/img.png"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let embed = &v["embeds"][0];
    assert_eq!(embed["title"], "Image Analysis");
    assert_eq!(embed["footer"]["text"], "Image Moderation");
    let safe = embed["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["name"] == "Safe Image")
        .unwrap();
    assert_eq!(safe["value"], "false");
}

#[tokio::test]
async fn thresholds_set_then_list_over_http() {
    let storage = sqlite_storage();
    let state = Arc::new(state_with(&storage, StubModerator::ok(json!({}))));

    let (_, v) = post_json(
        create_router(state.clone(), None),
        json!({
            "tenant_id": "guild-1",
            "caller": {"user_id": OWNER},
            "command": "thresholds",
            "sub": "set",
            "threshold": "AIGenerated",
            "value": "85%"
        }),
    )
    .await;
    assert_eq!(v["content"], "Set AIGenerated to 85.00%");

    let (_, v) = post_json(
        create_router(state, None),
        json!({
            "tenant_id": "guild-1",
            "caller": {"user_id": OWNER},
            "command": "thresholds"
        }),
    )
    .await;
    let value = v["embeds"][0]["fields"][0]["value"].as_str().unwrap();
    assert!(value.contains("AI Generated: 85%"), "{value}");
}

#[tokio::test]
async fn restricted_command_denied_for_plain_member() {
    let app = test_router(json!({}));
    let (status, v) = post_json(
        app,
        json!({
            "tenant_id": "guild-1",
            "caller": {"user_id": "someone", "roles": ["r1"]},
            "command": "ai",
            "image_url": "https://cdn.example/img.png"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["content"], "You don't have permission to use this command.");
}

#[tokio::test]
async fn malformed_body_is_rejected_by_extractor() {
    let app = test_router(json!({}));
    let (status, _) = post_json(app, json!({"command": "ping"})).await;
    assert!(status.is_client_error(), "missing caller should be a 4xx, got {status}");
}
