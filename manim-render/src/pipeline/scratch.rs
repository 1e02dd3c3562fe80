use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

/// Stem shared by a job's scratch script and its video.
///
/// Combines the sanitized filename, a microsecond timestamp and the first
/// segment of the job id, so concurrent jobs with the same filename never
/// collide.
pub(crate) fn artifact_stem(filename: &str, job_id: &str, now: DateTime<Local>) -> String {
    let short_id = job_id.split('-').next().unwrap_or(job_id);
    format!(
        "{filename}_{}_{short_id}",
        now.format("%Y%m%d_%H%M%S_%6f")
    )
}

/// Scene source written to disk for the renderer.
///
/// Removed by [`ScratchFile::remove`], or on drop if the owning future is
/// cancelled or panics first.
#[derive(Debug)]
pub(crate) struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    pub(crate) async fn create(dir: &Path, stem: &str, contents: &str) -> io::Result<Self> {
        let path = dir.join(format!("{stem}.py"));
        tokio::fs::write(&path, contents).await?;
        debug!(path = %path.display(), "Wrote scratch script");
        Ok(Self { path, armed: true })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn remove(mut self) {
        self.armed = false;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch script");
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch script");
        }
    }
}
