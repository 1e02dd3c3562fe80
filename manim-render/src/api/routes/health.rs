//! Liveness and service info routes.

use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{LivenessResponse, ServiceInfo};
use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(liveness_check))
}

/// Liveness check - the process is up and serving requests.
async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn service_info() -> Json<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("render", "/api/render"),
        ("render_status", "/api/render/{job_id}"),
        ("metrics", "/monitoring/jobs/metrics"),
        ("queue", "/monitoring/jobs/queue"),
        ("history", "/monitoring/jobs/history"),
        ("system_health", "/monitoring/system/health"),
        ("videos", "/static/videos"),
    ]);
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        endpoints,
    })
}
