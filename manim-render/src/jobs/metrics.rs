use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{HistoryRecord, JobStatus};

/// Aggregate view over the live jobs table and the completion history.
#[derive(Debug, Clone, Serialize)]
pub struct JobMetrics {
    pub total_jobs: usize,
    /// Count per status; every status is present.
    pub jobs_by_status: BTreeMap<String, usize>,
    /// Percentage of history records that ended `ready`.
    pub success_rate: f64,
    /// Percentage of history records that ended `error`.
    pub error_rate: f64,
    /// Mean processing time over history, in seconds.
    pub average_render_time: f64,
    pub queue_length: usize,
    pub last_job_created: Option<DateTime<Utc>>,
    pub last_job_completed: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
}

impl JobMetrics {
    /// Build metrics from `(status, created_at)` pairs of live jobs and the
    /// completion history.
    pub(crate) fn compute<'a>(
        jobs: impl IntoIterator<Item = (JobStatus, DateTime<Utc>)>,
        history: impl ExactSizeIterator<Item = &'a HistoryRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut jobs_by_status: BTreeMap<String, usize> = JobStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        let mut total_jobs = 0;
        let mut last_job_created = None;

        for (status, created_at) in jobs {
            total_jobs += 1;
            *jobs_by_status.entry(status.as_str().to_string()).or_default() += 1;
            if last_job_created.is_none_or(|last| created_at > last) {
                last_job_created = Some(created_at);
            }
        }

        let completed = history.len();
        let (mut succeeded, mut failed, mut total_time) = (0usize, 0usize, 0.0f64);
        let mut last_job_completed = None;
        for record in history {
            match record.status {
                JobStatus::Ready => succeeded += 1,
                JobStatus::Error => failed += 1,
                _ => {}
            }
            total_time += record.total_processing_time;
            if last_job_completed.is_none_or(|last| record.completed_at > last) {
                last_job_completed = Some(record.completed_at);
            }
        }

        let percent = |count: usize| {
            if completed == 0 {
                0.0
            } else {
                count as f64 / completed as f64 * 100.0
            }
        };
        let average_render_time = if completed == 0 {
            0.0
        } else {
            total_time / completed as f64
        };

        Self {
            total_jobs,
            queue_length: jobs_by_status
                .get(JobStatus::Queued.as_str())
                .copied()
                .unwrap_or_default(),
            jobs_by_status,
            success_rate: percent(succeeded),
            error_rate: percent(failed),
            average_render_time,
            last_job_created,
            last_job_completed,
            computed_at: now,
        }
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs_by_status
            .get(status.as_str())
            .copied()
            .unwrap_or_default()
    }
}

/// Recommended polling cadence for clients waiting on a job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PollingStrategy {
    pub initial_interval_secs: f64,
    pub max_interval_secs: f64,
    pub backoff_multiplier: f64,
    /// Attempts between successive backoff steps.
    pub attempts_per_step: u32,
    pub max_attempts: u32,
}

impl Default for PollingStrategy {
    fn default() -> Self {
        Self {
            initial_interval_secs: 2.0,
            max_interval_secs: 10.0,
            backoff_multiplier: 1.5,
            attempts_per_step: 5,
            max_attempts: 180,
        }
    }
}

impl PollingStrategy {
    /// Interval to wait before poll number `attempt` (zero-based).
    pub fn next_interval(&self, attempt: u32) -> Duration {
        let step = attempt / self.attempts_per_step.max(1);
        let secs = self.initial_interval_secs * self.backoff_multiplier.powi(step as i32);
        Duration::from_secs_f64(secs.min(self.max_interval_secs))
    }

    /// Total time a client following this strategy waits before giving up.
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts).map(|a| self.next_interval(a)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_backoff_steps_and_caps() {
        let strategy = PollingStrategy::default();
        assert_eq!(strategy.next_interval(0), Duration::from_secs(2));
        assert_eq!(strategy.next_interval(4), Duration::from_secs(2));
        assert_eq!(strategy.next_interval(5), Duration::from_secs(3));
        assert_eq!(strategy.next_interval(10), Duration::from_secs_f64(4.5));
        assert_eq!(strategy.next_interval(100), Duration::from_secs(10));
        assert_eq!(strategy.next_interval(179), Duration::from_secs(10));
    }

    #[test]
    fn test_polling_total_wait_is_bounded() {
        let strategy = PollingStrategy::default();
        let total = strategy.total_wait();
        assert!(total > Duration::from_secs(180 * 2));
        assert!(total <= Duration::from_secs(180 * 10));
    }

    #[test]
    fn test_compute_empty() {
        let metrics = JobMetrics::compute(
            Vec::<(JobStatus, DateTime<Utc>)>::new(),
            std::iter::empty::<&HistoryRecord>(),
            Utc::now(),
        );
        assert_eq!(metrics.total_jobs, 0);
        assert_eq!(metrics.jobs_by_status.len(), 4);
        assert!(metrics.jobs_by_status.values().all(|c| *c == 0));
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.average_render_time, 0.0);
        assert!(metrics.last_job_created.is_none());
    }
}
