use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::processor::JobProcessor;
use super::renderer::Renderer;
use super::worker_pool::{WorkerPool, WorkerPoolConfig};
use crate::Result;
use crate::jobs::{Job, JobStatus, JobStore};

/// Default bound on jobs waiting for a worker.
pub const DEFAULT_MAX_QUEUED_JOBS: usize = 50;

#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    /// Where scratch scripts are written. Must be absolute, the renderer
    /// runs with a different working directory.
    pub code_dir: PathBuf,
    pub max_queued_jobs: usize,
    pub workers: WorkerPoolConfig,
}

impl RenderPipelineConfig {
    pub fn new(code_dir: impl Into<PathBuf>) -> Self {
        Self {
            code_dir: code_dir.into(),
            max_queued_jobs: DEFAULT_MAX_QUEUED_JOBS,
            workers: WorkerPoolConfig::default(),
        }
    }

    pub fn with_max_queued_jobs(mut self, max_queued_jobs: usize) -> Self {
        self.max_queued_jobs = max_queued_jobs;
        self
    }

    pub fn with_workers(mut self, workers: WorkerPoolConfig) -> Self {
        self.workers = workers;
        self
    }
}

/// Result of an accepted submission.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job_id: String,
    pub status: JobStatus,
    pub queue_position: Option<usize>,
}

/// Entry point for render work.
///
/// Owns the worker pool; the job store is shared with readers.
pub struct RenderPipeline {
    config: RenderPipelineConfig,
    store: Arc<JobStore>,
    processor: Arc<JobProcessor>,
    pool: WorkerPool,
}

impl RenderPipeline {
    pub fn new(
        store: Arc<JobStore>,
        renderer: Arc<dyn Renderer>,
        config: RenderPipelineConfig,
    ) -> Self {
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            renderer,
            config.code_dir.clone(),
        ));
        Self {
            pool: WorkerPool::with_config(config.workers.clone()),
            config,
            store,
            processor,
        }
    }

    pub fn start(&self) {
        self.pool.start(self.store.clone(), self.processor.clone());
    }

    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Queue already-validated code for rendering and return immediately.
    ///
    /// Fails with a queue-full error, creating nothing, when
    /// `max_queued_jobs` jobs are already waiting.
    pub fn submit(&self, filename: &str, code: &str) -> Result<JobSubmission> {
        let job = Job::new(filename, code);
        let job_id = job.id.clone();

        self.store
            .admit(job, self.config.max_queued_jobs)
            .inspect_err(|e| warn!(filename = %filename, error = %e, "Render submission rejected"))?;

        let queue_position = self.store.queue_position(&job_id);
        info!(job_id = %job_id, filename = %filename, ?queue_position, "Render job queued");

        Ok(JobSubmission {
            job_id,
            status: JobStatus::Queued,
            queue_position,
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn config(&self) -> &RenderPipelineConfig {
        &self.config
    }

    /// Jobs currently being rendered by this pipeline's workers.
    pub fn active_renders(&self) -> usize {
        self.pool.active_count()
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }
}
