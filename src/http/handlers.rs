//! HTTP handlers for the admission gateway.
//!
//! Every request passes the auth guard before anything else runs; a rate
//! limit check then goes through explicit body validation and finally the
//! admission engine. Backend trouble never surfaces here: the caller
//! always receives a normal allow/deny decision.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, AuthGuard};
use crate::ratelimit::{AdmissionEngine, Decision, WindowConfig};

/// Shared application state.
pub struct AppState {
    pub engine: AdmissionEngine,
    pub guard: AuthGuard,
}

/// Malformed request body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(String);

/// A validated rate limit check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub key: String,
    pub window: WindowConfig,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Admission decision response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

/// Health check response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    redis: &'static str,
    memory_store_size: usize,
}

/// Validate a rate limit check body.
///
/// Rules: the body must be a JSON object; `key` is a required non-empty
/// string; `points` and `duration` are optional integers >= 1, defaulting
/// to 100 and 60.
pub fn parse_check_request(body: &[u8]) -> Result<CheckRequest, ValidationError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| ValidationError("Request body must be valid JSON".to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ValidationError("Request body must be a JSON object".to_string()))?;

    let key = match object.get("key") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(ValidationError(
                "key is required and must be a non-empty string".to_string(),
            ))
        }
    };

    let defaults = WindowConfig::default();
    let limit = parse_positive_field(object, "points", defaults.limit)?;
    let duration_secs = parse_positive_field(object, "duration", defaults.duration_secs)?;

    Ok(CheckRequest {
        key,
        window: WindowConfig {
            limit,
            duration_secs,
        },
    })
}

fn parse_positive_field(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    default: u64,
) -> Result<u64, ValidationError> {
    match object.get(field) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(value) => match value.as_u64() {
            Some(n) if n >= 1 => Ok(n),
            _ => Err(ValidationError(format!(
                "{field} must be a positive integer"
            ))),
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn auth_response(error: AuthError) -> Response {
    let status = match error {
        AuthError::MissingSignature => StatusCode::BAD_REQUEST,
        _ => StatusCode::UNAUTHORIZED,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Rate limit check endpoint.
pub async fn ratelimit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = state.guard.verify_signed(
        header_str(&headers, "authorization"),
        header_str(&headers, "x-timestamp"),
        header_str(&headers, "x-signature"),
    ) {
        warn!(%error, "Rejected unauthenticated rate limit check");
        return auth_response(error);
    }

    let request = match parse_check_request(&body) {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "Rejected malformed rate limit check");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response();
        }
    };

    debug!(
        key = %request.key,
        points = request.window.limit,
        duration = request.window.duration_secs,
        "Processing rate limit check"
    );

    match state.engine.check(&request.key, &request.window).await {
        Decision::Allow { remaining } => (
            StatusCode::OK,
            Json(CheckResponse {
                allowed: true,
                remaining: Some(remaining),
                retry_after: None,
            }),
        )
            .into_response(),
        Decision::Deny { retry_after } => {
            info!(key = %request.key, retry_after, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(CheckResponse {
                    allowed: false,
                    remaining: None,
                    retry_after: Some(retry_after),
                }),
            )
                .into_response()
        }
    }
}

/// Health check endpoint.
///
/// Requires only the bearer token; no signature headers.
pub async fn health(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(error) = state
        .guard
        .verify_bearer(header_str(&headers, "authorization"))
    {
        return auth_response(error);
    }

    let manager = state.engine.manager();
    let redis = if manager.health().connected {
        "connected"
    } else {
        "disconnected (using memory fallback)"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            redis,
            memory_store_size: manager.memory_store_size(),
        }),
    )
        .into_response()
}
