//! API server setup and configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::health::HealthMonitor;
use crate::jobs::JobStore;
use crate::pipeline::RenderPipeline;
use crate::rate_limit::RateLimiter;
use crate::retention::RetentionSweeper;
use crate::safety::CodeSafetyValidator;
use crate::services::ServiceContainer;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Origins allowed by CORS; `*` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            body_limit: 1024 * 1024, // 1MB
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Server start time
    pub start_time: Instant,
    pub store: Arc<JobStore>,
    pub pipeline: Arc<RenderPipeline>,
    pub validator: Arc<CodeSafetyValidator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub retention: Arc<RetentionSweeper>,
    pub health: Arc<HealthMonitor>,
    /// Directory served under the static videos prefix.
    pub videos_dir: PathBuf,
}

impl AppState {
    /// Wire the state from a constructed service container.
    pub fn from_services(services: &ServiceContainer) -> Self {
        Self {
            start_time: Instant::now(),
            store: services.store.clone(),
            pipeline: services.pipeline.clone(),
            validator: services.validator.clone(),
            rate_limiter: services.rate_limiter.clone(),
            retention: services.retention.clone(),
            health: services.health.clone(),
            videos_dir: services.videos_dir.clone(),
        }
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Use an externally owned token so that process-wide shutdown also
    /// stops the listener.
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let router = routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors_layer(&self.config.allowed_origins));

        router
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| {
                        if req.uri().path() == "/health" {
                            Span::none()
                        } else {
                            let request_id = req
                                .headers()
                                .get("x-request-id")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default();
                            tracing::info_span!(
                                "request",
                                method = %req.method(),
                                uri = %req.uri(),
                                request_id = %request_id,
                            )
                        }
                    })
                    .on_request(|_req: &Request, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        tracing::debug!("started processing request");
                    })
                    .on_response(
                        |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            let on_response = tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::INFO);
                            use tower_http::trace::OnResponse;
                            on_response.on_response(res, latency, span);
                        },
                    )
                    .on_failure(
                        |class: tower_http::classify::ServerErrorsFailureClass,
                         latency: Duration,
                         span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            let mut on_failure = tower_http::trace::DefaultOnFailure::new()
                                .level(tracing::Level::ERROR);
                            use tower_http::trace::OnFailure;
                            on_failure.on_failure(class, latency, span);
                        },
                    ),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let router = self.build_router();
        let listener =
            TcpListener::bind((self.config.bind_address.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            tracing::info!("API server shutting down...");
        })
        .await
        .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_cors_layer_accepts_wildcard_and_lists() {
        // Both shapes must build without panicking.
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&[
            "http://localhost:3000".to_string(),
            "not a header\n".to_string(),
        ]);
    }
}
