//! Operational visibility: metrics, queue, history, per-job details,
//! manual cleanup and the aggregate health report.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::models::{
    CleanupQuery, CleanupResponse, HistoryQuery, HistoryResponse, JobDetailsResponse, JobGroup,
    MetricsResponse, QueueResponse,
};
use crate::api::server::AppState;
use crate::error::Error;
use crate::health::{HealthStatus, SystemHealth};
use crate::jobs::{DEFAULT_RENDER_ESTIMATE, JobStatus, PollingStrategy};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;
const DEFAULT_CLEANUP_AGE_HOURS: i64 = 24;
const MAX_CLEANUP_AGE_HOURS: i64 = 168;

/// Create the monitoring router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/metrics", get(job_metrics))
        .route("/jobs/queue", get(job_queue))
        .route("/jobs/history", get(job_history))
        .route("/jobs/{job_id}/details", get(job_details))
        .route("/jobs/cleanup", post(cleanup_jobs))
        .route("/system/health", get(system_health))
}

async fn job_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let metrics = state.store.metrics(false);
    Json(MetricsResponse::new(metrics, PollingStrategy::default()))
}

async fn job_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let queued = state.store.get_jobs_by_status(JobStatus::Queued);
    let rendering = state.store.get_jobs_by_status(JobStatus::Rendering);

    let average = state.store.metrics(false).average_render_time;
    let per_job = if average > 0.0 {
        average
    } else {
        DEFAULT_RENDER_ESTIMATE.as_secs_f64()
    };

    Json(QueueResponse {
        estimated_queue_time_seconds: queued.len() as f64 * per_job,
        max_workers: state.pipeline.config().workers.max_workers,
        queue: JobGroup::new(&queued),
        rendering: JobGroup::new(&rendering),
    })
}

async fn job_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT) as usize;
    Json(HistoryResponse::new(state.store.history(limit)))
}

async fn job_details(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobDetailsResponse>> {
    let job = state
        .store
        .get_job(&job_id)
        .ok_or_else(|| Error::not_found("Job", &job_id))?;

    let mut details = JobDetailsResponse::from_job(&job);
    if job.status == JobStatus::Queued {
        details.queue_position = state.store.queue_position(&job.id);
        details.estimated_wait_time_seconds = state
            .store
            .estimated_wait(&job.id)
            .map(|wait| wait.as_secs_f64());
    }
    Ok(Json(details))
}

async fn cleanup_jobs(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Json<CleanupResponse> {
    let hours = query
        .max_age_hours
        .unwrap_or(DEFAULT_CLEANUP_AGE_HOURS)
        .clamp(1, MAX_CLEANUP_AGE_HOURS) as u64;

    let report = state
        .retention
        .run_once(Duration::from_secs(hours * 60 * 60));
    info!(
        max_age_hours = hours,
        jobs_removed = report.jobs_removed,
        "Manual cleanup completed"
    );

    Json(CleanupResponse {
        cleanup_completed: true,
        max_age_hours: hours,
        jobs_cleaned: report.jobs_removed,
        rate_limit_keys_cleaned: report.rate_limit_keys_removed,
        message: format!(
            "Cleaned up {} jobs older than {} hours",
            report.jobs_removed, hours
        ),
    })
}

/// 200 when healthy or degraded, 503 when a component is down.
async fn system_health(State(state): State<AppState>) -> (StatusCode, Json<SystemHealth>) {
    let report = state.health.check();
    let code = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (code, Json(report))
}
