//! Bounded pool of render workers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::processor::JobProcessor;
use crate::jobs::JobStore;

/// Configuration for the render worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Concurrent renders.
    pub max_workers: usize,
    /// Fallback poll interval in milliseconds when no notification arrives.
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            poll_interval_ms: 1000,
        }
    }
}

/// A fixed set of worker tasks that claim and render queued jobs.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// Jobs currently being rendered.
    active_jobs: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_config(WorkerPoolConfig::default())
    }

    pub fn with_config(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            active_jobs: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Spawn the workers. Each drains the queue, then sleeps until notified,
    /// the poll interval passes or the pool is stopped.
    pub(crate) fn start(&self, store: Arc<JobStore>, processor: Arc<JobProcessor>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Render worker pool already stopped, not starting");
            return;
        };
        if !join_set.is_empty() {
            warn!("Render worker pool already started");
            return;
        }

        info!(
            "Starting render worker pool with {} workers ({} renderer)",
            self.config.max_workers,
            processor.renderer_name()
        );

        for i in 0..self.config.max_workers {
            let store = store.clone();
            let processor = processor.clone();
            let notifier = store.notifier();
            let cancellation_token = self.cancellation_token.clone();
            let active_jobs = self.active_jobs.clone();

            join_set.spawn(async move {
                debug!("Render worker {} started", i);

                loop {
                    while !cancellation_token.is_cancelled() {
                        let Some(job) = store.claim_next() else {
                            break;
                        };
                        debug!(job_id = %job.id, "Render worker {} claimed job", i);
                        active_jobs.fetch_add(1, Ordering::SeqCst);
                        processor.run(job, &cancellation_token).await;
                        active_jobs.fetch_sub(1, Ordering::SeqCst);
                    }

                    tokio::select! {
                        _ = cancellation_token.cancelled() => {
                            break;
                        }
                        _ = notifier.notified() => {
                            // New job available
                        }
                        _ = tokio::time::sleep(poll_interval) => {
                            // Poll timeout
                        }
                    }
                }

                debug!("Render worker {} shutting down", i);
            });
        }
    }

    /// Stop all workers. In-flight renders are cancelled and recorded as
    /// errors before this returns.
    pub async fn stop(&self) {
        info!("Stopping render worker pool");
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    warn!("Render worker ended abnormally: {}", e);
                }
            }
        }

        info!("Render worker pool stopped");
    }

    /// Number of jobs currently being rendered.
    pub fn active_count(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[tokio::test]
    async fn test_worker_pool_stop_without_start() {
        let pool = WorkerPool::new();
        assert!(pool.is_running());
        assert_eq!(pool.active_count(), 0);

        pool.stop().await;
        assert!(!pool.is_running());
    }
}
