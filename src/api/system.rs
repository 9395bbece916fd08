//! Service information endpoints and the JSON 404/405 fallbacks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{OriginalUri, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde_json::{json, Value};

use super::routes::{AppState, API_PREFIX};
use super::types::{ConfigInfoResponse, HealthResponse, LlmInfo, TaskInfo};

const SERVICE_NAME: &str = "wandr-backend";

/// Paths listed in 404 responses.
const AVAILABLE_ENDPOINTS: &[&str] = &[
    "/api/v1/health",
    "/api/v1/status",
    "/api/v1/config",
    "/api/v1/test",
    "/api/v1/process-text-command",
    "/api/v1/get-command-result/{task_id}",
];

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Wandr Backend is running successfully".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Detailed service status.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0);
    let extraction = if state.executor.is_configured() {
        "enabled"
    } else {
        "unconfigured"
    };

    Json(json!({
        "api": {
            "name": "Wandr Travel Backend",
            "version": env!("CARGO_PKG_VERSION"),
            "status": "operational",
            "endpoints": {
                "health": format!("{}/health", API_PREFIX),
                "status": format!("{}/status", API_PREFIX),
                "config": format!("{}/config", API_PREFIX),
                "process_text_command": format!("{}/process-text-command", API_PREFIX),
                "get_command_result": format!("{}/get-command-result/{{task_id}}", API_PREFIX),
            },
        },
        "system": {
            "platform": std::env::consts::OS,
            "architecture": std::env::consts::ARCH,
            "timestamp": Utc::now().to_rfc3339(),
            "uptime_seconds": uptime,
        },
        "features": {
            "text_command_extraction": extraction,
            "task_store": state.executor.store().kind().as_str(),
        },
    }))
}

/// Non-sensitive configuration.
pub async fn config_info(State(state): State<Arc<AppState>>) -> Json<ConfigInfoResponse> {
    let config = &state.config;
    let limits = state.executor.limits();
    Json(ConfigInfoResponse {
        environment: config.environment.as_str().to_string(),
        debug_mode: config.debug,
        cors_origins: config.cors_origins.clone(),
        llm: LlmInfo {
            model: config.llm.model.clone(),
            timeout_secs: config.llm.timeout.as_secs(),
            credential_configured: config.llm.has_credential(),
        },
        tasks: TaskInfo {
            store: state.executor.store().kind().as_str().to_string(),
            max_concurrent: limits.max_concurrent,
            max_queued: limits.max_queued,
            outstanding: state.executor.outstanding(),
        },
    })
}

/// Echo request details back, for checking connectivity from a client.
pub async fn test_endpoint(
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(args): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let mut response = json!({
        "method": method.as_str(),
        "timestamp": Utc::now().to_rfc3339(),
        "headers": headers,
        "args": args,
        "url": uri.to_string(),
        "message": "Test endpoint working correctly",
    });

    if method == Method::POST {
        let json_data = serde_json::from_slice::<Value>(&body).ok();
        response["json_data"] = json_data.unwrap_or(Value::Null);
    }

    Json(response)
}

/// Fallback for unknown paths.
pub async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    tracing::debug!(path = %uri.path(), "No route matched");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": format!("The requested endpoint {} does not exist.", uri.path()),
            "available_endpoints": AVAILABLE_ENDPOINTS,
            "status_code": 404,
        })),
    )
}

/// Fallback for a known path called with an unsupported method.
pub async fn method_not_allowed(
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> impl IntoResponse {
    tracing::debug!(method = %method, path = %uri.path(), "Method not allowed");
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "Method Not Allowed",
            "message": format!("The method {} is not allowed for {}.", method, uri.path()),
            "status_code": 405,
        })),
    )
}
