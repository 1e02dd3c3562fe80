//! API route modules.
//!
//! Organizes routes by resource type.

pub mod health;
pub mod monitoring;
pub mod render;

use axum::{Router, middleware};
use tower_http::services::ServeDir;

use crate::api::middleware::rate_limit;
use crate::api::models::STATIC_VIDEOS_PATH;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let api = render::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit,
    ));

    Router::new()
        .merge(api)
        .nest("/monitoring", monitoring::router())
        .merge(health::router())
        .nest_service(STATIC_VIDEOS_PATH, ServeDir::new(&state.videos_dir))
        .with_state(state)
}
