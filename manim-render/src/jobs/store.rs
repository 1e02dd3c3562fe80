use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info};

use super::metrics::JobMetrics;
use super::model::{HistoryRecord, Job, JobStatus, JobUpdate};
use crate::{Error, Result};

/// Completion records kept before the oldest is evicted.
pub const HISTORY_CAPACITY: usize = 1000;
/// History outlives jobs by this factor of the cleanup age.
pub const HISTORY_RETENTION_FACTOR: u32 = 7;
/// How long computed metrics are served from cache.
pub const METRICS_CACHE_TTL: Duration = Duration::from_secs(30);
/// Per-job estimate used for wait times before any job has completed.
pub const DEFAULT_RENDER_ESTIMATE: Duration = Duration::from_secs(30);

/// Tunables for [`JobStore`].
#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    pub history_capacity: usize,
    pub metrics_ttl: Duration,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: HISTORY_CAPACITY,
            metrics_ttl: METRICS_CACHE_TTL,
        }
    }
}

struct CachedMetrics {
    metrics: JobMetrics,
    computed: Instant,
}

/// Authoritative in-memory table of render jobs.
///
/// Jobs sit in a `DashMap`, so updates to different jobs proceed in
/// parallel while updates to the same job are serialized by its shard lock.
/// A terminal transition appends to the history while still holding that
/// lock, which makes "status changed" and "history recorded" one step.
///
/// Lock order is job shard, then history. Readers that need both collect
/// from the jobs table first and release it before touching the history.
pub struct JobStore {
    config: JobStoreConfig,
    jobs: DashMap<String, Job>,
    history: Mutex<VecDeque<HistoryRecord>>,
    /// Number of jobs currently `queued`.
    queued: AtomicUsize,
    metrics_cache: RwLock<Option<CachedMetrics>>,
    /// Signalled whenever a queued job is added.
    notify: Arc<Notify>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_config(JobStoreConfig::default())
    }

    pub fn with_config(config: JobStoreConfig) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity.min(1024))),
            config,
            jobs: DashMap::new(),
            queued: AtomicUsize::new(0),
            metrics_cache: RwLock::new(None),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle that is notified each time a queued job is added.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Insert a job. Fails if a job with the same id already exists.
    pub fn add_job(&self, job: Job) -> Result<()> {
        let queued = job.status == JobStatus::Queued;
        if queued {
            self.queued.fetch_add(1, Ordering::SeqCst);
        }
        self.insert(job).inspect_err(|_| {
            if queued {
                self.queued.fetch_sub(1, Ordering::SeqCst);
            }
        })
    }

    /// Insert a queued job unless `max_queued` jobs are already waiting.
    ///
    /// The queue slot is reserved before insertion, so concurrent admissions
    /// can never push the queue past `max_queued`.
    pub fn admit(&self, job: Job, max_queued: usize) -> Result<()> {
        if job.status != JobStatus::Queued {
            return Err(Error::validation(format!(
                "only queued jobs can be admitted, got {}",
                job.status
            )));
        }

        self.queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max_queued).then_some(n + 1)
            })
            .map_err(|_| Error::QueueFull {
                capacity: max_queued,
            })?;

        self.insert(job).inspect_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn insert(&self, job: Job) -> Result<()> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(entry) => Err(Error::AlreadyExists {
                entity_type: "Job".to_string(),
                id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let queued = job.status == JobStatus::Queued;
                info!(job_id = %job.id, filename = %job.filename, status = %job.status, "Job added");
                entry.insert(job);
                if queued {
                    self.notify.notify_one();
                }
                Ok(())
            }
        }
    }

    /// Apply a status change.
    ///
    /// Returns `Ok(false)` when the job does not exist and an
    /// invalid-transition error when the change is not allowed; in both cases
    /// nothing is modified.
    pub fn update_job(&self, id: &str, update: JobUpdate) -> Result<bool> {
        self.transition(id, update).map(|job| job.is_some())
    }

    fn transition(&self, id: &str, update: JobUpdate) -> Result<Option<Job>> {
        let Some(mut entry) = self.jobs.get_mut(id) else {
            return Ok(None);
        };
        let job = entry.value_mut();

        let from = job.status;
        let to = update.target_status();
        if !from.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        update.apply(job, now);
        if from == JobStatus::Queued {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }
        if to.is_terminal() {
            self.record_history(HistoryRecord::from_job(job, now));
        }

        info!(job_id = %id, from = %from, to = %to, "Job status changed");
        Ok(Some(job.clone()))
    }

    fn record_history(&self, record: HistoryRecord) {
        let mut history = self.history.lock();
        history.push_back(record);
        while history.len() > self.config.history_capacity {
            history.pop_front();
        }
    }

    /// Claim the oldest queued job by moving it to `rendering`.
    ///
    /// Returns the claimed job, code included. Two callers never receive
    /// the same job.
    pub fn claim_next(&self) -> Option<Job> {
        loop {
            let next_id = self
                .jobs
                .iter()
                .filter(|entry| entry.status == JobStatus::Queued)
                .min_by(|a, b| queue_order(a.value(), b.value()))
                .map(|entry| entry.key().clone())?;

            match self.transition(&next_id, JobUpdate::Rendering) {
                Ok(Some(job)) => return Some(job),
                // Claimed or removed by someone else in the meantime.
                Ok(None) | Err(_) => continue,
            }
        }
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Jobs in `status`, oldest first.
    pub fn get_jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.collect_sorted(|job| job.status == status)
    }

    /// Queued and rendering jobs, oldest first.
    pub fn get_active_jobs(&self) -> Vec<Job> {
        self.collect_sorted(|job| job.status.is_active())
    }

    fn collect_sorted(&self, keep: impl Fn(&Job) -> bool) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(queue_order);
        jobs
    }

    pub fn remove_job(&self, id: &str) -> bool {
        match self.jobs.remove(id) {
            Some((_, job)) => {
                if job.status == JobStatus::Queued {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                }
                debug!(job_id = %id, "Job removed");
                true
            }
            None => false,
        }
    }

    /// 1-based rank of a queued job, ordered by creation time then id.
    pub fn queue_position(&self, id: &str) -> Option<usize> {
        let (created_at, id) = {
            let job = self.jobs.get(id)?;
            if job.status != JobStatus::Queued {
                return None;
            }
            (job.created_at, job.id.clone())
        };

        let ahead = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.status == JobStatus::Queued
                    && (entry.created_at, entry.id.as_str()) < (created_at, id.as_str())
            })
            .count();
        Some(ahead + 1)
    }

    /// Expected wait before a queued job starts rendering.
    ///
    /// Uses the historical average render time, or
    /// [`DEFAULT_RENDER_ESTIMATE`] per job ahead when there is no history.
    pub fn estimated_wait(&self, id: &str) -> Option<Duration> {
        let position = self.queue_position(id)?;
        let ahead = (position - 1) as f64;
        let average = self.metrics(false).average_render_time;
        let per_job = if average > 0.0 {
            average
        } else {
            DEFAULT_RENDER_ESTIMATE.as_secs_f64()
        };
        Some(Duration::from_secs_f64(ahead * per_job))
    }

    /// Remove jobs older than `max_age` and history older than
    /// [`HISTORY_RETENTION_FACTOR`] times that. Returns the jobs removed.
    pub fn cleanup_older_than(&self, max_age: Duration) -> usize {
        self.cleanup_older_than_at(max_age, Utc::now())
    }

    pub fn cleanup_older_than_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        if let Some(cutoff) = cutoff(now, max_age) {
            self.jobs.retain(|_, job| {
                if job.created_at >= cutoff {
                    return true;
                }
                if job.status == JobStatus::Queued {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                }
                removed += 1;
                false
            });
        }

        let mut pruned = 0;
        let history_age = max_age.saturating_mul(HISTORY_RETENTION_FACTOR);
        if let Some(cutoff) = cutoff(now, history_age) {
            let mut history = self.history.lock();
            let before = history.len();
            history.retain(|record| record.completed_at >= cutoff);
            pruned = before - history.len();
        }

        if removed > 0 || pruned > 0 {
            info!(
                removed,
                pruned_history = pruned,
                max_age_secs = max_age.as_secs(),
                "Cleaned up old jobs"
            );
        }
        removed
    }

    /// Current metrics, recomputed when the cache is stale or on request.
    pub fn metrics(&self, force_refresh: bool) -> JobMetrics {
        if !force_refresh {
            let cache = self.metrics_cache.read();
            if let Some(cached) = cache.as_ref()
                && cached.computed.elapsed() < self.config.metrics_ttl
            {
                return cached.metrics.clone();
            }
        }

        let jobs: Vec<(JobStatus, DateTime<Utc>)> = self
            .jobs
            .iter()
            .map(|entry| (entry.status, entry.created_at))
            .collect();
        let metrics = {
            let history = self.history.lock();
            JobMetrics::compute(jobs, history.iter(), Utc::now())
        };

        *self.metrics_cache.write() = Some(CachedMetrics {
            metrics: metrics.clone(),
            computed: Instant::now(),
        });
        debug!(total_jobs = metrics.total_jobs, "Recomputed job metrics");
        metrics
    }

    /// Most recent `limit` history records, oldest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryRecord> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Number of jobs waiting to be claimed.
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs that have been `rendering` for longer than `threshold`.
    pub fn stuck_jobs(&self, threshold: Duration) -> Vec<Job> {
        self.stuck_jobs_at(threshold, Utc::now())
    }

    pub fn stuck_jobs_at(&self, threshold: Duration, now: DateTime<Utc>) -> Vec<Job> {
        let Some(cutoff) = cutoff(now, threshold) else {
            return Vec::new();
        };
        self.collect_sorted(|job| job.status == JobStatus::Rendering && job.updated_at < cutoff)
    }
}

fn queue_order(a: &Job, b: &Job) -> CmpOrdering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// `now - age`, or `None` when that predates the representable range.
fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn queued_at(secs_ago: i64) -> Job {
        Job::new("demo", "from manim import *").with_created_at(Utc::now() - chrono::Duration::seconds(secs_ago))
    }

    fn ready(video: &str) -> JobUpdate {
        JobUpdate::Ready {
            video_path: PathBuf::from(video),
        }
    }

    fn failed(message: &str) -> JobUpdate {
        JobUpdate::Failed {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_add_and_get() {
        let store = JobStore::new();
        let job = Job::new("demo", "code");
        let id = job.id.clone();

        store.add_job(job).unwrap();
        let fetched = store.get_job(&id).unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(store.queue_depth(), 1);
        assert!(store.get_job("missing").is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let store = JobStore::new();
        let job = Job::new("demo", "code").with_id("fixed");
        store.add_job(job.clone()).unwrap();

        assert!(matches!(
            store.add_job(job),
            Err(Error::AlreadyExists { .. })
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.queue_depth(), 1);
    }

    #[test]
    fn test_full_lifecycle_clears_code_and_records_history() {
        let store = JobStore::new();
        let job = Job::new("demo", "code");
        let id = job.id.clone();
        store.add_job(job).unwrap();

        assert!(store.update_job(&id, JobUpdate::Rendering).unwrap());
        assert_eq!(store.queue_depth(), 0);
        assert!(store.get_job(&id).unwrap().code.is_some());
        assert_eq!(store.history_len(), 0);

        assert!(store.update_job(&id, ready("videos/demo.mp4")).unwrap());
        let done = store.get_job(&id).unwrap();
        assert_eq!(done.status, JobStatus::Ready);
        assert!(done.code.is_none());
        assert_eq!(done.video_path, Some(PathBuf::from("videos/demo.mp4")));
        assert!(done.error_message.is_none());

        let history = store.history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].status, JobStatus::Ready);
    }

    #[test]
    fn test_invalid_transitions_leave_job_untouched() {
        let store = JobStore::new();
        let job = Job::new("demo", "code");
        let id = job.id.clone();
        store.add_job(job).unwrap();

        assert!(matches!(
            store.update_job(&id, ready("x.mp4")),
            Err(Error::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            store.update_job(&id, failed("nope")),
            Err(Error::InvalidStateTransition { .. })
        ));
        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error_message.is_none());

        store.update_job(&id, JobUpdate::Rendering).unwrap();
        store.update_job(&id, failed("boom")).unwrap();
        let before = store.get_job(&id).unwrap();

        for update in [JobUpdate::Rendering, ready("x.mp4"), failed("again")] {
            assert!(store.update_job(&id, update).is_err());
        }
        let after = store.get_job(&id).unwrap();
        assert_eq!(after.status, JobStatus::Error);
        assert_eq!(after.error_message.as_deref(), Some("boom"));
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn test_update_unknown_job() {
        let store = JobStore::new();
        assert!(!store.update_job("missing", JobUpdate::Rendering).unwrap());
    }

    #[test]
    fn test_history_is_bounded() {
        let store = JobStore::with_config(JobStoreConfig {
            history_capacity: 3,
            ..Default::default()
        });

        let mut ids = Vec::new();
        for _ in 0..5 {
            let job = Job::new("demo", "code");
            ids.push(job.id.clone());
            store.add_job(job).unwrap();
            store.claim_next().unwrap();
            store.update_job(ids.last().unwrap(), ready("x.mp4")).unwrap();
        }

        let history = store.history(10);
        assert_eq!(history.len(), 3);
        let kept: Vec<&str> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(kept, vec![ids[2].as_str(), ids[3].as_str(), ids[4].as_str()]);
        assert_eq!(store.history(2).len(), 2);
        assert_eq!(store.history(2)[1].id, ids[4]);
    }

    #[test]
    fn test_queue_position_and_wait() {
        let store = JobStore::new();
        let first = queued_at(30);
        let second = queued_at(20);
        let third = queued_at(10);
        let (a, b, c) = (first.id.clone(), second.id.clone(), third.id.clone());
        // Insert out of order; ranking follows creation time.
        store.add_job(third).unwrap();
        store.add_job(first).unwrap();
        store.add_job(second).unwrap();

        assert_eq!(store.queue_position(&a), Some(1));
        assert_eq!(store.queue_position(&b), Some(2));
        assert_eq!(store.queue_position(&c), Some(3));
        assert_eq!(store.queue_position("missing"), None);

        assert_eq!(store.estimated_wait(&a), Some(Duration::ZERO));
        assert_eq!(store.estimated_wait(&c), Some(Duration::from_secs(60)));

        let claimed = store.claim_next().unwrap();
        assert_eq!(claimed.id, a);
        assert_eq!(store.queue_position(&a), None);
        assert_eq!(store.estimated_wait(&a), None);
        assert_eq!(store.queue_position(&c), Some(2));
    }

    #[test]
    fn test_removing_queued_job_shifts_positions() {
        let store = JobStore::new();
        let jobs: Vec<Job> = [40, 30, 20, 10].into_iter().map(queued_at).collect();
        let ids: Vec<String> = jobs.iter().map(|job| job.id.clone()).collect();
        for job in jobs {
            store.add_job(job).unwrap();
        }
        assert_eq!(store.queue_depth(), 4);

        assert!(store.remove_job(&ids[1]));
        assert!(!store.remove_job(&ids[1]));

        assert_eq!(store.queue_position(&ids[0]), Some(1));
        assert_eq!(store.queue_position(&ids[1]), None);
        assert_eq!(store.queue_position(&ids[2]), Some(2));
        assert_eq!(store.queue_position(&ids[3]), Some(3));
        assert_eq!(store.estimated_wait(&ids[3]), Some(Duration::from_secs(60)));
        assert_eq!(store.queue_depth(), 3);
    }

    #[test]
    fn test_queue_ties_break_on_id() {
        let store = JobStore::new();
        let at = Utc::now();
        let low = Job::new("a", "code").with_id("aaa").with_created_at(at);
        let high = Job::new("b", "code").with_id("bbb").with_created_at(at);
        store.add_job(high).unwrap();
        store.add_job(low).unwrap();

        assert_eq!(store.queue_position("aaa"), Some(1));
        assert_eq!(store.queue_position("bbb"), Some(2));
        assert_eq!(store.claim_next().unwrap().id, "aaa");
    }

    #[test]
    fn test_admit_enforces_queue_bound() {
        let store = JobStore::new();
        store.admit(Job::new("a", "code"), 2).unwrap();
        store.admit(Job::new("b", "code"), 2).unwrap();

        assert!(matches!(
            store.admit(Job::new("c", "code"), 2),
            Err(Error::QueueFull { capacity: 2 })
        ));
        assert_eq!(store.len(), 2);

        store.claim_next().unwrap();
        store.admit(Job::new("c", "code"), 2).unwrap();
        assert_eq!(store.queue_depth(), 2);
    }

    #[test]
    fn test_claim_next_is_exclusive_across_threads() {
        let store = Arc::new(JobStore::new());
        for _ in 0..64 {
            store.add_job(Job::new("demo", "code")).unwrap();
        }

        let claimed: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    scope.spawn(move || {
                        let mut mine = Vec::new();
                        while let Some(job) = store.claim_next() {
                            mine.push(job.id);
                        }
                        mine
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let mut unique = claimed.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(claimed.len(), 64);
        assert_eq!(unique.len(), 64);
        assert_eq!(store.queue_depth(), 0);
        assert_eq!(store.get_jobs_by_status(JobStatus::Rendering).len(), 64);
    }

    #[test]
    fn test_remove_job() {
        let store = JobStore::new();
        let job = Job::new("demo", "code");
        let id = job.id.clone();
        store.add_job(job).unwrap();

        assert!(store.remove_job(&id));
        assert!(!store.remove_job(&id));
        assert_eq!(store.queue_depth(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_removes_old_jobs_and_is_idempotent() {
        let store = JobStore::new();
        let old = queued_at(3 * 3600);
        let fresh = queued_at(60);
        let fresh_id = fresh.id.clone();
        store.add_job(old).unwrap();
        store.add_job(fresh).unwrap();

        let max_age = Duration::from_secs(3600);
        assert_eq!(store.cleanup_older_than(max_age), 1);
        assert_eq!(store.cleanup_older_than(max_age), 0);
        assert!(store.get_job(&fresh_id).is_some());
        assert_eq!(store.queue_depth(), 1);
    }

    #[test]
    fn test_cleanup_prunes_history_at_seven_times_age() {
        let store = JobStore::new();
        let job = Job::new("demo", "code");
        let id = job.id.clone();
        store.add_job(job).unwrap();
        store.claim_next().unwrap();
        store.update_job(&id, ready("x.mp4")).unwrap();

        let max_age = Duration::from_secs(3600);
        let now = Utc::now();

        // Six hours later the job is gone but history is kept.
        let later = now + chrono::Duration::hours(6);
        assert_eq!(store.cleanup_older_than_at(max_age, later), 1);
        assert_eq!(store.history_len(), 1);

        // Past seven hours the history record goes too.
        let much_later = now + chrono::Duration::hours(8);
        assert_eq!(store.cleanup_older_than_at(max_age, much_later), 0);
        assert_eq!(store.history_len(), 0);
    }

    #[test]
    fn test_cleanup_with_huge_age_removes_nothing() {
        let store = JobStore::new();
        store.add_job(queued_at(10)).unwrap();
        assert_eq!(store.cleanup_older_than(Duration::MAX), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_metrics_counts_and_rates() {
        let store = JobStore::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let job = Job::new("demo", "code");
            ids.push(job.id.clone());
            store.add_job(job).unwrap();
        }
        for id in &ids[..3] {
            store.update_job(id, JobUpdate::Rendering).unwrap();
        }
        store.update_job(&ids[0], ready("a.mp4")).unwrap();
        store.update_job(&ids[1], failed("boom")).unwrap();

        let metrics = store.metrics(true);
        assert_eq!(metrics.total_jobs, 4);
        assert_eq!(metrics.count(JobStatus::Queued), 1);
        assert_eq!(metrics.count(JobStatus::Rendering), 1);
        assert_eq!(metrics.count(JobStatus::Ready), 1);
        assert_eq!(metrics.count(JobStatus::Error), 1);
        assert_eq!(metrics.queue_length, 1);
        assert_eq!(metrics.success_rate, 50.0);
        assert_eq!(metrics.error_rate, 50.0);
        assert!(metrics.last_job_created.is_some());
        assert!(metrics.last_job_completed.is_some());
    }

    #[test]
    fn test_metrics_are_cached_until_forced() {
        let store = JobStore::new();
        assert_eq!(store.metrics(false).total_jobs, 0);

        store.add_job(Job::new("demo", "code")).unwrap();
        assert_eq!(store.metrics(false).total_jobs, 0);
        assert_eq!(store.metrics(true).total_jobs, 1);
        assert_eq!(store.metrics(false).total_jobs, 1);
    }

    #[test]
    fn test_metrics_cache_expires() {
        let store = JobStore::with_config(JobStoreConfig {
            metrics_ttl: Duration::ZERO,
            ..Default::default()
        });
        assert_eq!(store.metrics(false).total_jobs, 0);
        store.add_job(Job::new("demo", "code")).unwrap();
        assert_eq!(store.metrics(false).total_jobs, 1);
    }

    #[test]
    fn test_active_and_stuck_jobs() {
        let store = JobStore::new();
        let a = queued_at(600);
        let b = queued_at(500);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        store.add_job(a).unwrap();
        store.add_job(b).unwrap();
        store.claim_next().unwrap();

        let active: Vec<String> = store.get_active_jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(active, vec![a_id.clone(), b_id]);

        let threshold = Duration::from_secs(300);
        assert!(store.stuck_jobs(threshold).is_empty());
        let later = Utc::now() + chrono::Duration::seconds(301);
        let stuck = store.stuck_jobs_at(threshold, later);
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, a_id);
    }
}
