//! Router-level tests for the HTTP surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use turnstile::auth::{AuthContext, AuthGuard};
use turnstile::http::{router, AppState};
use turnstile::ratelimit::{AdmissionEngine, BackendManager, MemoryBackend};

const SECRET: &str = "integration-secret";

fn test_guard() -> AuthGuard {
    AuthGuard::new(AuthContext {
        secret: SECRET.to_string(),
        max_skew_ms: 30_000,
    })
}

fn test_router() -> Router {
    let local = Arc::new(MemoryBackend::new());
    let manager = Arc::new(BackendManager::local_only(local));
    let state = Arc::new(AppState {
        engine: AdmissionEngine::new(manager),
        guard: test_guard(),
    });
    router(state)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build a signed POST /ratelimit request.
fn signed_check(body: &str, timestamp: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ratelimit")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Timestamp", timestamp)
        .header("X-Signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn valid_check(body: &str) -> Request<Body> {
    let ts = now_ms().to_string();
    let sig = test_guard().sign(&ts);
    signed_check(body, &ts, &sig)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_allowed_check_reports_remaining() {
    let app = test_router();

    let (status, body) = send(&app, valid_check(r#"{"key": "caller"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["remaining"], 99);
}

#[tokio::test]
async fn test_exhausted_window_returns_429() {
    let app = test_router();
    let body = r#"{"key": "caller", "points": 2, "duration": 10}"#;

    send(&app, valid_check(body)).await;
    send(&app, valid_check(body)).await;

    let request = valid_check(body);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["allowed"], false);
    assert!(json["retryAfter"].as_u64().unwrap() <= 10);
}

#[tokio::test]
async fn test_health_requires_only_bearer() {
    let app = test_router();

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["redis"], "disconnected (using memory fallback)");
    assert_eq!(body["memoryStoreSize"], 0);
}

#[tokio::test]
async fn test_health_rejects_wrong_bearer() {
    let app = test_router();

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_missing_timestamp_is_bad_request() {
    let app = test_router();

    let ts = now_ms().to_string();
    let sig = test_guard().sign(&ts);
    let request = Request::builder()
        .method("POST")
        .uri("/ratelimit")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .header("X-Signature", sig)
        .body(Body::from(r#"{"key": "caller"}"#))
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing signature");
}

#[tokio::test]
async fn test_stale_timestamp_is_unauthorized() {
    let app = test_router();

    // 40 seconds in the past, outside the 30 second skew window, with an
    // otherwise-valid signature over that timestamp.
    let ts = (now_ms() - 40_000).to_string();
    let sig = test_guard().sign(&ts);

    let (status, body) = send(&app, signed_check(r#"{"key": "caller"}"#, &ts, &sig)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Expired request");
}

#[tokio::test]
async fn test_wrong_secret_signature_is_unauthorized() {
    let app = test_router();

    let ts = now_ms().to_string();
    let wrong = AuthGuard::new(AuthContext {
        secret: "the-wrong-secret".to_string(),
        max_skew_ms: 30_000,
    });
    let sig = wrong.sign(&ts);

    let (status, body) = send(&app, signed_check(r#"{"key": "caller"}"#, &ts, &sig)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid signature");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_router();

    let (status, body) = send(&app, valid_check("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, valid_check(r#"{"points": 5}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "key is required and must be a non-empty string");

    let (status, body) = send(&app, valid_check(r#"{"key": "k", "points": 0}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "points must be a positive integer");
}

#[tokio::test]
async fn test_auth_runs_before_validation() {
    let app = test_router();

    // Garbage body and a bad bearer: the auth failure wins.
    let ts = now_ms().to_string();
    let sig = test_guard().sign(&ts);
    let request = Request::builder()
        .method("POST")
        .uri("/ratelimit")
        .header(header::AUTHORIZATION, "Bearer nope")
        .header("X-Timestamp", ts)
        .header("X-Signature", sig)
        .body(Body::from("not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_health_reflects_memory_store_size() {
    let app = test_router();

    send(&app, valid_check(r#"{"key": "a"}"#)).await;
    send(&app, valid_check(r#"{"key": "b"}"#)).await;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memoryStoreSize"], 2);
}

#[tokio::test]
async fn test_signature_replay_is_accepted_within_skew_window() {
    // Documented limitation: no nonce tracking, so a captured valid
    // (timestamp, signature) pair replays until the skew window closes.
    let app = test_router();

    let ts = now_ms().to_string();
    let sig = test_guard().sign(&ts);

    let (status, _) = send(&app, signed_check(r#"{"key": "caller"}"#, &ts, &sig)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, signed_check(r#"{"key": "caller"}"#, &ts, &sig)).await;
    assert_eq!(status, StatusCode::OK);
}
