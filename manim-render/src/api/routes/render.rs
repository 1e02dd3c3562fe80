//! Render submission and status routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::models::{CreateRenderRequest, RenderJobResponse};
use crate::api::server::AppState;
use crate::error::Error;
use crate::safety::validate_filename;

/// Routes are registered with their full paths so the matched route
/// template doubles as the rate-limit endpoint key.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/render", post(submit_render))
        .route("/api/render/{job_id}", get(get_render_status))
}

/// Validate and enqueue a render.
async fn submit_render(
    State(state): State<AppState>,
    Json(request): Json<CreateRenderRequest>,
) -> ApiResult<Json<RenderJobResponse>> {
    let filename = validate_filename(&request.filename)?;
    let code = state.validator.validate(&request.code)?;

    let submission = state.pipeline.submit(&filename, &code)?;
    info!(
        job_id = %submission.job_id,
        filename = %filename,
        queue_position = ?submission.queue_position,
        "Render job accepted"
    );

    Ok(Json(RenderJobResponse::queued(submission.job_id)))
}

async fn get_render_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<RenderJobResponse>> {
    let job = state
        .store
        .get_job(&job_id)
        .ok_or_else(|| Error::not_found("Job", &job_id))?;
    Ok(Json(RenderJobResponse::from_job(&job)))
}
