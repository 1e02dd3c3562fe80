//! Periodic pruning of aged jobs, history and idle rate-limit windows.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::jobs::JobStore;
use crate::rate_limit::RateLimiter;

/// Configuration for retention sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Jobs older than this are removed on each sweep.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Interval between sweeps in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_check_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age_hours(mut self, hours: u64) -> Self {
        self.max_age_hours = hours;
        self
    }

    pub fn with_check_interval_secs(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(3600))
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub jobs_removed: usize,
    pub rate_limit_keys_removed: usize,
}

/// Prunes the job store and the rate limiter on a fixed schedule.
pub struct RetentionSweeper {
    config: RetentionConfig,
    store: Arc<JobStore>,
    limiter: Arc<RateLimiter>,
}

impl RetentionSweeper {
    pub fn new(config: RetentionConfig, store: Arc<JobStore>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            config,
            store,
            limiter,
        }
    }

    /// Sweep everything older than `max_age` now.
    pub fn run_once(&self, max_age: Duration) -> RetentionReport {
        let report = RetentionReport {
            jobs_removed: self.store.cleanup_older_than(max_age),
            rate_limit_keys_removed: self.limiter.sweep(max_age),
        };
        debug!(
            jobs_removed = report.jobs_removed,
            rate_limit_keys_removed = report.rate_limit_keys_removed,
            "Retention sweep completed"
        );
        report
    }

    /// Run sweeps with the configured age every `check_interval_secs` until
    /// cancelled. The first sweep happens one interval after start.
    pub fn start_background_task(self: &Arc<Self>, cancellation_token: CancellationToken) {
        let sweeper = self.clone();
        let period = Duration::from_secs(self.config.check_interval_secs.max(1));

        tokio::spawn(async move {
            let mut check_interval = interval_at(Instant::now() + period, period);
            check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Retention sweeper started (max age: {}h, interval: {}s)",
                sweeper.config.max_age_hours,
                period.as_secs()
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Retention sweeper shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        let report = sweeper.run_once(sweeper.config.max_age());
                        if report.jobs_removed > 0 || report.rate_limit_keys_removed > 0 {
                            info!(
                                "Retention sweep removed {} jobs and {} rate-limit keys",
                                report.jobs_removed, report.rate_limit_keys_removed
                            );
                        }
                    }
                }
            }
        });
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }
}
