//! Request and response bodies.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{HistoryRecord, Job, JobMetrics, JobStatus, PollingStrategy};

/// URL prefix under which rendered videos are served.
pub const STATIC_VIDEOS_PATH: &str = "/static/videos";

/// Public URL of a rendered video file.
pub fn video_url(video_path: &Path) -> Option<String> {
    video_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("{}/{}", STATIC_VIDEOS_PATH, name))
}

/// Body of `POST /api/render`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRenderRequest {
    pub filename: String,
    pub code: String,
}

/// Render job status as seen by the submitting client.
///
/// `videoUrl` and `error` are always present and `null` when not set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

impl RenderJobResponse {
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            video_url: None,
            error: None,
        }
    }

    pub fn from_job(job: &Job) -> Self {
        let video_url = match job.status {
            JobStatus::Ready => job.video_path.as_deref().and_then(video_url),
            _ => None,
        };
        Self {
            job_id: job.id.clone(),
            status: job.status,
            video_url,
            error: job.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PerformanceStats {
    pub average_render_time_seconds: f64,
    pub success_rate_percent: f64,
    pub error_rate_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct MetricsTimestamps {
    pub last_job_created: Option<DateTime<Utc>>,
    pub last_job_completed: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
}

/// Body of `GET /monitoring/jobs/metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub total_jobs: usize,
    pub jobs_by_status: BTreeMap<String, usize>,
    pub queue_length: usize,
    pub performance: PerformanceStats,
    pub timestamps: MetricsTimestamps,
    pub polling_strategy: PollingStrategy,
}

impl MetricsResponse {
    pub fn new(metrics: JobMetrics, polling_strategy: PollingStrategy) -> Self {
        Self {
            total_jobs: metrics.total_jobs,
            jobs_by_status: metrics.jobs_by_status,
            queue_length: metrics.queue_length,
            performance: PerformanceStats {
                average_render_time_seconds: metrics.average_render_time,
                success_rate_percent: metrics.success_rate,
                error_rate_percent: metrics.error_rate,
            },
            timestamps: MetricsTimestamps {
                last_job_created: metrics.last_job_created,
                last_job_completed: metrics.last_job_completed,
                computed_at: metrics.computed_at,
            },
            polling_strategy,
        }
    }
}

/// Job listing entry. Never carries the submitted code.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            filename: job.filename.clone(),
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobGroup {
    pub count: usize,
    pub jobs: Vec<JobSummary>,
}

impl JobGroup {
    pub fn new(jobs: &[Job]) -> Self {
        Self {
            count: jobs.len(),
            jobs: jobs.iter().map(JobSummary::from).collect(),
        }
    }
}

/// Body of `GET /monitoring/jobs/queue`.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queue: JobGroup,
    pub rendering: JobGroup,
    pub max_workers: usize,
    pub estimated_queue_time_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistorySummary {
    pub total_completed: usize,
    pub successful: usize,
    pub failed: usize,
}

/// History record as exposed over HTTP: the video is given by URL.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: HistoryRecord,
    pub video_url: Option<String>,
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        let video_url = record.video_path.as_deref().and_then(video_url);
        Self { record, video_url }
    }
}

/// Body of `GET /monitoring/jobs/history`.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history_count: usize,
    pub jobs: Vec<HistoryEntry>,
    pub summary: HistorySummary,
}

impl HistoryResponse {
    pub fn new(jobs: Vec<HistoryRecord>) -> Self {
        let successful = jobs
            .iter()
            .filter(|r| r.status == JobStatus::Ready)
            .count();
        let failed = jobs
            .iter()
            .filter(|r| r.status == JobStatus::Error)
            .count();
        Self {
            history_count: jobs.len(),
            summary: HistorySummary {
                total_completed: jobs.len(),
                successful,
                failed,
            },
            jobs: jobs.into_iter().map(HistoryEntry::from).collect(),
        }
    }
}

/// Body of `GET /monitoring/jobs/{job_id}/details`.
#[derive(Debug, Serialize)]
pub struct JobDetailsResponse {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_processing_time_seconds: Option<f64>,
}

impl JobDetailsResponse {
    pub fn from_job(job: &Job) -> Self {
        let response = RenderJobResponse::from_job(job);
        Self {
            id: job.id.clone(),
            filename: job.filename.clone(),
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            video_url: response.video_url,
            error_message: job.error_message.clone(),
            queue_position: None,
            estimated_wait_time_seconds: None,
            total_processing_time_seconds: job
                .status
                .is_terminal()
                .then(|| job.processing_time_secs()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    pub max_age_hours: Option<i64>,
}

/// Body of `POST /monitoring/jobs/cleanup`.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub cleanup_completed: bool,
    pub max_age_hours: u64,
    pub jobs_cleaned: usize,
    pub rate_limit_keys_cleaned: usize,
    pub message: String,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobUpdate;
    use std::path::PathBuf;

    #[test]
    fn test_render_response_serializes_nulls() {
        let json = serde_json::to_value(RenderJobResponse::queued("abc")).unwrap();
        assert_eq!(json["jobId"], "abc");
        assert_eq!(json["status"], "queued");
        assert!(json.get("videoUrl").unwrap().is_null());
        assert!(json.get("error").unwrap().is_null());
    }

    #[test]
    fn test_video_url_only_when_ready() {
        let mut job = Job::new("circle", "code");
        assert_eq!(RenderJobResponse::from_job(&job).video_url, None);

        JobUpdate::Rendering.apply(&mut job, Utc::now());
        JobUpdate::Ready {
            video_path: PathBuf::from("/data/videos/circle_1.mp4"),
        }
        .apply(&mut job, Utc::now());

        let response = RenderJobResponse::from_job(&job);
        assert_eq!(
            response.video_url.as_deref(),
            Some("/static/videos/circle_1.mp4")
        );
        assert_eq!(response.error, None);
    }

    #[test]
    fn test_history_summary() {
        let mut ok = Job::new("a", "code");
        JobUpdate::Rendering.apply(&mut ok, Utc::now());
        JobUpdate::Ready {
            video_path: PathBuf::from("a.mp4"),
        }
        .apply(&mut ok, Utc::now());
        let mut failed = Job::new("b", "code");
        JobUpdate::Rendering.apply(&mut failed, Utc::now());
        JobUpdate::Failed {
            message: "boom".into(),
        }
        .apply(&mut failed, Utc::now());

        let records = vec![
            HistoryRecord::from_job(&ok, Utc::now()),
            HistoryRecord::from_job(&failed, Utc::now()),
        ];
        let response = HistoryResponse::new(records);
        assert_eq!(response.history_count, 2);
        assert_eq!(response.summary.successful, 1);
        assert_eq!(response.summary.failed, 1);

        let json = serde_json::to_value(&response).unwrap();
        let first = &json["jobs"][0];
        assert!(first.get("video_path").is_none());
        assert_eq!(first["video_url"], "/static/videos/a.mp4");
        assert_eq!(first["status"], "ready");
        assert!(json["jobs"][1]["video_url"].is_null());
    }

    #[test]
    fn test_details_omit_processing_time_while_active() {
        let job = Job::new("circle", "code");
        let json = serde_json::to_value(JobDetailsResponse::from_job(&job)).unwrap();
        assert!(json.get("total_processing_time_seconds").is_none());
        assert!(json.get("code").is_none());
    }
}
