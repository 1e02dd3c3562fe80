//! Service container for dependency injection.
//!
//! Builds every long-lived service from an [`AppConfig`] and owns their
//! start/stop lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::health::HealthMonitor;
use crate::jobs::JobStore;
use crate::pipeline::{
    ManimRenderer, ManimRendererConfig, RenderPipeline, RenderPipelineConfig, Renderer,
};
use crate::rate_limit::RateLimiter;
use crate::retention::RetentionSweeper;
use crate::safety::CodeSafetyValidator;
use crate::{Error, Result};

/// Container holding all application services.
pub struct ServiceContainer {
    pub config: AppConfig,
    pub store: Arc<JobStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub validator: Arc<CodeSafetyValidator>,
    pub pipeline: Arc<RenderPipeline>,
    pub retention: Arc<RetentionSweeper>,
    pub health: Arc<HealthMonitor>,
    /// Absolute directory for scratch scripts.
    pub code_dir: PathBuf,
    /// Absolute directory for rendered videos.
    pub videos_dir: PathBuf,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build the services with the `manim` command-line renderer.
    pub fn new(config: AppConfig) -> Result<Self> {
        let videos_dir = prepare_dir(&config.videos_dir())?;
        let renderer = ManimRenderer::new(ManimRendererConfig {
            command: config.render.command.clone(),
            quality: config.render.quality,
            videos_dir,
            timeout: config.render.timeout,
        });
        Self::with_renderer(config, Arc::new(renderer))
    }

    /// Build the services around a caller-supplied renderer.
    pub fn with_renderer(config: AppConfig, renderer: Arc<dyn Renderer>) -> Result<Self> {
        info!("Initializing service container");

        let code_dir = prepare_dir(&config.code_dir())?;
        let videos_dir = prepare_dir(&config.videos_dir())?;

        let store = Arc::new(JobStore::new());
        let rate_limiter = Arc::new(RateLimiter::default());
        let validator = Arc::new(CodeSafetyValidator::new());

        let pipeline_config = RenderPipelineConfig::new(&code_dir)
            .with_max_queued_jobs(config.render.max_queued_jobs)
            .with_workers(config.render.workers.clone());
        let pipeline = Arc::new(RenderPipeline::new(
            store.clone(),
            renderer,
            pipeline_config,
        ));

        let retention = Arc::new(RetentionSweeper::new(
            config.retention.clone(),
            store.clone(),
            rate_limiter.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            store.clone(),
            rate_limiter.clone(),
            pipeline.clone(),
            videos_dir.clone(),
        ));

        info!(
            code_dir = %code_dir.display(),
            videos_dir = %videos_dir.display(),
            "Service container initialized"
        );

        Ok(Self {
            config,
            store,
            rate_limiter,
            validator,
            pipeline,
            retention,
            health,
            code_dir,
            videos_dir,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Start the worker pool and the retention sweeper.
    pub fn start(&self) {
        self.pipeline.start();
        self.retention
            .start_background_task(self.cancellation_token.child_token());
        info!(
            workers = self.pipeline.config().workers.max_workers,
            "Services started"
        );
    }

    /// Stop background work. Jobs still rendering are marked failed.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.pipeline.stop().await;
        info!("Services shut down");
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// Create `dir` if needed and return it as an absolute path.
fn prepare_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::config(format!("cannot create directory {}: {}", dir.display(), e))
    })?;
    Ok(std::path::absolute(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_container_creates_directories() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: temp.path().join("storage"),
            ..AppConfig::default()
        };

        let services = ServiceContainer::new(config).unwrap();
        assert!(services.code_dir.is_dir());
        assert!(services.videos_dir.is_dir());
        assert!(services.videos_dir.is_absolute());
        assert!(services.store.is_empty());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        let services = ServiceContainer::new(config).unwrap();

        services.start();
        assert!(services.pipeline.is_running());

        services.shutdown().await;
        assert!(services.is_shutting_down());
        assert!(!services.pipeline.is_running());
    }
}
