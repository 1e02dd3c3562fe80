//! Service health heuristics.
//!
//! Reports degraded health when too many recent jobs failed or when jobs
//! have sat in `rendering` longer than expected. Stuck jobs are only
//! reported, never remediated.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::jobs::{JobStatus, JobStore};
use crate::pipeline::RenderPipeline;
use crate::rate_limit::RateLimiter;

/// Health status of a component or the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Working, but something needs attention.
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health information for a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Headline job numbers included in the health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub success_rate: f64,
    pub error_rate: f64,
    pub average_render_time: f64,
    pub queue_length: usize,
    pub active_renders: usize,
}

/// Overall service health.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub components: BTreeMap<String, ComponentHealth>,
    pub metrics: HealthMetrics,
    /// Ids of jobs rendering for longer than the stuck threshold.
    pub stuck_jobs: Vec<String>,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

/// Thresholds for the health heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// A job rendering longer than this is reported as stuck.
    #[serde(default = "default_stuck_job_threshold_secs")]
    pub stuck_job_threshold_secs: u64,
    /// Error rate (percent of history) above which health is degraded.
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
}

fn default_stuck_job_threshold_secs() -> u64 {
    300
}

fn default_max_error_rate() -> f64 {
    50.0
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stuck_job_threshold_secs: default_stuck_job_threshold_secs(),
            max_error_rate: default_max_error_rate(),
        }
    }
}

/// Read-only health checker over the running services.
pub struct HealthMonitor {
    config: HealthConfig,
    store: Arc<JobStore>,
    limiter: Arc<RateLimiter>,
    pipeline: Arc<RenderPipeline>,
    videos_dir: PathBuf,
    started: Instant,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        store: Arc<JobStore>,
        limiter: Arc<RateLimiter>,
        pipeline: Arc<RenderPipeline>,
        videos_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            store,
            limiter,
            pipeline,
            videos_dir,
            started: Instant::now(),
        }
    }

    pub fn check(&self) -> SystemHealth {
        self.check_at(Utc::now())
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> SystemHealth {
        let metrics = self.store.metrics(false);
        let active = self.store.get_active_jobs();
        let threshold = Duration::from_secs(self.config.stuck_job_threshold_secs);
        let stuck_jobs: Vec<String> = self
            .store
            .stuck_jobs_at(threshold, now)
            .into_iter()
            .map(|job| job.id)
            .collect();

        let mut issues = Vec::new();
        if metrics.error_rate > self.config.max_error_rate {
            issues.push(format!("High error rate: {:.1}%", metrics.error_rate));
        }
        if !stuck_jobs.is_empty() {
            issues.push(format!(
                "{} jobs stuck in rendering state",
                stuck_jobs.len()
            ));
        }

        let mut components = BTreeMap::new();
        components.insert(
            "job_store".to_string(),
            ComponentHealth::healthy(format!(
                "{} active of {} jobs",
                active.len(),
                metrics.total_jobs
            )),
        );
        components.insert(
            "rate_limiting".to_string(),
            ComponentHealth::healthy(format!(
                "{} active windows",
                self.limiter.active_keys()
            )),
        );
        components.insert(
            "render_workers".to_string(),
            if self.pipeline.is_running() {
                ComponentHealth::healthy(format!(
                    "{} of {} workers busy",
                    self.pipeline.active_renders(),
                    self.pipeline.config().workers.max_workers
                ))
            } else {
                ComponentHealth::unhealthy("worker pool stopped")
            },
        );
        components.insert(
            "file_storage".to_string(),
            if self.videos_dir.is_dir() {
                ComponentHealth::healthy(self.videos_dir.display().to_string())
            } else {
                ComponentHealth::unhealthy(format!(
                    "videos directory {} is missing",
                    self.videos_dir.display()
                ))
            },
        );

        let status = if components
            .values()
            .any(|c| c.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        debug!(%status, issues = issues.len(), "Health check completed");

        SystemHealth {
            status,
            issues,
            components,
            metrics: HealthMetrics {
                success_rate: metrics.success_rate,
                error_rate: metrics.error_rate,
                average_render_time: metrics.average_render_time,
                queue_length: metrics.count(JobStatus::Queued),
                active_renders: self.pipeline.active_renders(),
            },
            stuck_jobs,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            timestamp: now,
        }
    }
}
