use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::renderer::{RenderFailure, RenderRequest, Renderer, extract_scene_name};
use super::scratch::{ScratchFile, artifact_stem};
use crate::jobs::{Job, JobStore, JobUpdate};
use crate::{Error, Result};

/// Drives claimed jobs from `rendering` to a terminal state.
pub(crate) struct JobProcessor {
    store: Arc<JobStore>,
    renderer: Arc<dyn Renderer>,
    code_dir: PathBuf,
}

impl JobProcessor {
    pub(crate) fn new(store: Arc<JobStore>, renderer: Arc<dyn Renderer>, code_dir: PathBuf) -> Self {
        Self {
            store,
            renderer,
            code_dir,
        }
    }

    pub(crate) fn renderer_name(&self) -> &'static str {
        self.renderer.name()
    }

    /// Process one claimed job and record its outcome.
    ///
    /// Never panics and never leaves the job in `rendering`: renderer
    /// errors, panics and cancellation all end in `error`.
    pub(crate) async fn run(&self, job: Job, cancel: &CancellationToken) {
        let job_id = job.id.clone();
        let started = Instant::now();

        let work = AssertUnwindSafe(self.render(&job)).catch_unwind();
        let outcome = tokio::select! {
            outcome = work => outcome,
            _ = cancel.cancelled() => Ok(Err(RenderFailure::Cancelled.into())),
        };

        let update = match outcome {
            Ok(Ok(video_path)) => {
                info!(
                    job_id = %job_id,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Render succeeded"
                );
                JobUpdate::Ready { video_path }
            }
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "Render failed");
                JobUpdate::Failed {
                    message: failure_message(&e),
                }
            }
            Err(panic) => {
                let message = format!("Render processing error: {}", panic_message(panic.as_ref()));
                error!(job_id = %job_id, %message, "Render task panicked");
                JobUpdate::Failed { message }
            }
        };

        match self.store.update_job(&job_id, update) {
            Ok(true) => {}
            Ok(false) => warn!(job_id = %job_id, "Job disappeared before its result was recorded"),
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to record render result"),
        }
    }

    async fn render(&self, job: &Job) -> Result<PathBuf> {
        let code = job
            .code
            .as_deref()
            .ok_or_else(|| Error::Other(format!("job {} has no source code", job.id)))?;

        let stem = artifact_stem(&job.filename, &job.id, Local::now());
        let scratch = ScratchFile::create(&self.code_dir, &stem, code).await?;

        let result = async {
            let scene = extract_scene_name(code).ok_or(RenderFailure::MissingScene)?;
            debug!(job_id = %job.id, scene = %scene, "Extracted scene");
            let request = RenderRequest {
                job_id: job.id.clone(),
                script_path: scratch.path().to_path_buf(),
                scene,
                output_name: format!("{stem}.mp4"),
            };
            self.renderer.render(&request).await
        }
        .await;

        scratch.remove().await;
        result
    }
}

/// Message stored on a job that ends in `error`.
fn failure_message(err: &Error) -> String {
    match err {
        Error::Render(failure) => failure.to_string(),
        other => format!("Render processing error: {other}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
