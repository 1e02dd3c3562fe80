//! Request middleware.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::error::Error;

/// Paths under this prefix are subject to rate limiting.
const RATE_LIMITED_PREFIX: &str = "/api/";

/// Best-effort client address.
///
/// Prefers the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Sliding-window rate limiting keyed by client and route template.
///
/// The route template (`/api/render/{job_id}`) is used rather than the raw
/// path so that every job id shares one window.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if !path.starts_with(RATE_LIMITED_PREFIX) {
        return next.run(request).await;
    }

    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| path.to_string());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_ip(request.headers(), peer);

    if let Err(limit) = state.rate_limiter.check(&client, &endpoint) {
        tracing::warn!(
            client = %client,
            endpoint = %endpoint,
            limit = limit.limit,
            window_secs = limit.window.as_secs(),
            "Rate limit exceeded"
        );
        let mut response = ApiError::from(Error::RateLimited {
            limit: limit.limit,
            window_secs: limit.window.as_secs(),
        })
        .into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(limit.window.as_secs()),
        );
        return response;
    }

    next.run(request).await
}
