use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::db;
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "AtivePlay Sync",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    store: &'static str,
    /// None when running on the in-memory store
    #[serde(skip_serializing_if = "Option::is_none")]
    postgres: Option<bool>,
    /// None when progress publication is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    redis: Option<bool>,
}

async fn postgres_status(state: &AppState) -> Option<bool> {
    match &state.pool {
        Some(pool) => Some(db::health_check(pool).await),
        None => None,
    }
}

async fn redis_status(state: &AppState) -> Option<bool> {
    match &state.redis {
        Some(redis) => Some(redis.ping().await.unwrap_or(false)),
        None => None,
    }
}

/// GET /health - Dependency health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let postgres = postgres_status(&state).await;
    let redis = redis_status(&state).await;

    // Redis only carries progress, so losing it degrades but never fails
    let status = match (postgres, redis) {
        (Some(false), _) => "unhealthy",
        (_, Some(false)) => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime,
        store: if state.pool.is_some() { "postgres" } else { "memory" },
        postgres,
        redis,
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Readiness probe (for Kubernetes)
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let postgres = postgres_status(&state).await;
    let redis = redis_status(&state).await;

    match (postgres, redis) {
        (Some(false), _) => (StatusCode::SERVICE_UNAVAILABLE, "not ready - postgres unavailable"),
        (_, Some(false)) => (StatusCode::OK, "ready (redis degraded)"),
        _ => (StatusCode::OK, "ready"),
    }
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
