use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use crate::handlers::AppState;

/// Component health status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Basic liveness probe - just checks if the service is running
async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness probe - checks that storage is reachable and a trained model
/// artifact is bound for inference
async fn readiness_check(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();

    let db_check_start = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let db_latency = db_check_start.elapsed().as_millis() as u64;

    let database = ComponentHealth {
        status: if db_result.is_ok() {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        },
        message: db_result.map_or_else(
            |e| format!("Connection failed: {}", e),
            |_| "Connection successful".to_string(),
        ),
        latency_ms: Some(db_latency),
    };

    let model_loaded = state.model.is_loaded();
    let model = ComponentHealth {
        status: if model_loaded {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        },
        message: state
            .model
            .snapshot()
            .map(|a| format!("Active artifact {}", a.version))
            .unwrap_or_else(|| "No active model artifact".to_string()),
        latency_ms: None,
    };

    let is_ready = matches!(database.status, ComponentStatus::Up) && model_loaded;
    let body = json!({
        "status": if is_ready { "ready" } else { "not_ready" },
        "checks": {
            "database": database,
            "model": model,
        },
        "response_time_ms": start.elapsed().as_millis()
    });

    if is_ready {
        Ok((StatusCode::OK, Json(body)))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(body)))
    }
}

/// Creates the router for health check endpoints
///
/// Endpoints:
/// - GET /health        - Basic liveness probe (always returns 200 if the server is running)
/// - GET /health/ready  - Readiness probe (database connectivity + active model artifact)
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness_check))
        .route("/ready", get(readiness_check))
}
