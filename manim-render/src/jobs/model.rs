use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a render job.
///
/// Jobs only move forward: `queued -> rendering -> ready | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Rendering,
    Ready,
    Error,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Rendering,
        JobStatus::Ready,
        JobStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Rendering => "rendering",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// Queued or rendering.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Rendering)
                | (Self::Rendering, Self::Ready)
                | (Self::Rendering, Self::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A render job as held by the store.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub filename: String,
    /// Submitted source. Dropped once the job reaches a terminal state.
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub video_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new queued job with a fresh id.
    pub fn new(filename: impl Into<String>, code: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            filename: filename.into(),
            code: Some(code.into()),
            created_at: now,
            updated_at: now,
            video_path: None,
            error_message: None,
        }
    }

    /// Backdate the job, keeping `updated_at` in step.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Seconds between creation and the last update.
    pub fn processing_time_secs(&self) -> f64 {
        seconds_between(self.created_at, self.updated_at)
    }
}

/// A requested status change.
///
/// Each variant names its target state and carries exactly the data that
/// state needs, so the store never sees a half-formed update.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Rendering,
    Ready { video_path: PathBuf },
    Failed { message: String },
}

impl JobUpdate {
    pub fn target_status(&self) -> JobStatus {
        match self {
            Self::Rendering => JobStatus::Rendering,
            Self::Ready { .. } => JobStatus::Ready,
            Self::Failed { .. } => JobStatus::Error,
        }
    }

    pub(crate) fn apply(self, job: &mut Job, now: DateTime<Utc>) {
        job.status = self.target_status();
        job.updated_at = now;
        match self {
            Self::Rendering => {}
            Self::Ready { video_path } => {
                job.video_path = Some(video_path);
                job.error_message = None;
            }
            Self::Failed { message } => {
                job.error_message = Some(message);
                job.video_path = None;
            }
        }
        if job.status.is_terminal() {
            job.code = None;
        }
    }
}

/// Snapshot of a job taken when it reached a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub id: String,
    pub status: JobStatus,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Server-side location; never serialized.
    #[serde(skip_serializing)]
    pub video_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
    /// Seconds from creation to completion.
    pub total_processing_time: f64,
}

impl HistoryRecord {
    pub fn from_job(job: &Job, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            filename: job.filename.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            video_path: job.video_path.clone(),
            error_message: job.error_message.clone(),
            completed_at,
            total_processing_time: seconds_between(job.created_at, completed_at),
        }
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use JobStatus::*;

        assert!(Queued.can_transition_to(Rendering));
        assert!(Rendering.can_transition_to(Ready));
        assert!(Rendering.can_transition_to(Error));

        assert!(!Queued.can_transition_to(Ready));
        assert!(!Queued.can_transition_to(Error));
        assert!(!Queued.can_transition_to(Queued));
        assert!(!Rendering.can_transition_to(Queued));
        assert!(!Rendering.can_transition_to(Rendering));
        for terminal in [Ready, Error] {
            for next in JobStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Rendering).unwrap(),
            "\"rendering\""
        );
        assert_eq!(JobStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_new_job_is_queued_with_code() {
        let job = Job::new("demo", "from manim import *");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.code.as_deref(), Some("from manim import *"));
        assert_eq!(job.created_at, job.updated_at);
        assert!(Uuid::parse_str(&job.id).is_ok());
        assert_ne!(job.id, Job::new("demo", "x").id);
    }

    #[test]
    fn test_terminal_update_clears_code() {
        let mut job = Job::new("demo", "code");
        let now = Utc::now();

        JobUpdate::Rendering.apply(&mut job, now);
        assert_eq!(job.status, JobStatus::Rendering);
        assert!(job.code.is_some());

        JobUpdate::Failed {
            message: "boom".into(),
        }
        .apply(&mut job, now);
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.code.is_none());
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert!(job.video_path.is_none());
    }

    #[test]
    fn test_history_record_processing_time() {
        let created = Utc::now() - chrono::Duration::seconds(12);
        let mut job = Job::new("demo", "code").with_created_at(created);
        JobUpdate::Rendering.apply(&mut job, created);
        let done = created + chrono::Duration::milliseconds(12_500);
        JobUpdate::Ready {
            video_path: PathBuf::from("videos/demo.mp4"),
        }
        .apply(&mut job, done);

        let record = HistoryRecord::from_job(&job, done);
        assert_eq!(record.status, JobStatus::Ready);
        assert_eq!(record.total_processing_time, 12.5);
        assert_eq!(record.video_path, Some(PathBuf::from("videos/demo.mp4")));
    }
}
