//! External renderer invocation.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{CommandOutcome, run_with_timeout, tokio_command};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

/// Directory, relative to the media root, where manim writes videos.
const MEDIA_VIDEOS_SUBDIR: &str = "videos";
/// How deep to look for a relocated artifact below the media subtree.
const MAX_SEARCH_DEPTH: usize = 4;

static SCENE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)\s*\(\s*Scene\s*\)").unwrap());

/// Name of the first `class <Name>(Scene)` declared in `code`.
pub fn extract_scene_name(code: &str) -> Option<String> {
    SCENE_CLASS_RE
        .captures(code)
        .map(|caps| caps[1].to_string())
}

/// Ways a render can fail after the job was claimed.
///
/// The display strings are what clients see as the job's error message.
#[derive(Debug, Error)]
pub enum RenderFailure {
    #[error("No Scene class found in code")]
    MissingScene,

    #[error("Failed to start renderer: {0}")]
    Launch(#[source] io::Error),

    #[error("Manim rendering failed with exit code {code}")]
    ExitCode { code: i32 },

    #[error("Rendering timed out after {seconds} seconds")]
    TimedOut { seconds: u64 },

    #[error("Rendering finished but no video was produced")]
    MissingOutput,

    #[error("Render cancelled: service is shutting down")]
    Cancelled,
}

/// Output quality preset passed to manim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderQuality {
    #[default]
    Low,
    Medium,
    High,
}

impl RenderQuality {
    /// Value for manim's `--quality` flag.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Low => "l",
            Self::Medium => "m",
            Self::High => "h",
        }
    }
}

impl fmt::Display for RenderQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

impl FromStr for RenderQuality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Self::Low),
            "m" | "medium" => Ok(Self::Medium),
            "h" | "high" => Ok(Self::High),
            other => Err(Error::config(format!(
                "unknown render quality '{other}', expected L, M or H"
            ))),
        }
    }
}

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub job_id: String,
    /// Scratch file holding the scene source.
    pub script_path: PathBuf,
    /// Scene class to render.
    pub scene: String,
    /// File name the finished video must have.
    pub output_name: String,
}

/// Turns a scene script into a video file.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render `request`, returning the final path of the video.
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct ManimRendererConfig {
    /// Program to run, `manim` unless overridden.
    pub command: String,
    pub quality: RenderQuality,
    /// Media root and final home of rendered videos. Also the child's cwd.
    pub videos_dir: PathBuf,
    pub timeout: Duration,
}

/// Renders through the `manim` command-line tool.
#[derive(Debug, Clone)]
pub struct ManimRenderer {
    config: ManimRendererConfig,
}

impl ManimRenderer {
    pub fn new(config: ManimRendererConfig) -> Self {
        Self { config }
    }

    fn command(&self, request: &RenderRequest) -> tokio::process::Command {
        let mut cmd = tokio_command(&self.config.command);
        cmd.arg(&request.script_path)
            .arg(&request.scene)
            .arg(format!("--quality={}", self.config.quality.flag()))
            .arg(format!("--output_file={}", request.output_name))
            .arg("--media_dir")
            .arg(&self.config.videos_dir)
            .arg("--disable_caching")
            .arg("--write_to_movie")
            .current_dir(&self.config.videos_dir);
        cmd
    }
}

#[async_trait]
impl Renderer for ManimRenderer {
    fn name(&self) -> &'static str {
        "manim"
    }

    async fn render(&self, request: &RenderRequest) -> Result<PathBuf> {
        info!(
            job_id = %request.job_id,
            scene = %request.scene,
            output = %request.output_name,
            quality = %self.config.quality,
            "Starting manim render"
        );

        let outcome = run_with_timeout(self.command(request), self.config.timeout)
            .await
            .map_err(RenderFailure::Launch)?;

        match outcome {
            CommandOutcome::TimedOut { elapsed } => {
                warn!(
                    job_id = %request.job_id,
                    elapsed_secs = elapsed.as_secs(),
                    "Manim render timed out, process killed"
                );
                Err(RenderFailure::TimedOut {
                    seconds: self.config.timeout.as_secs(),
                }
                .into())
            }
            CommandOutcome::Exited {
                status,
                stderr_tail,
                ..
            } if !status.success() => {
                // Killed by a signal has no exit code.
                let code = status.code().unwrap_or(-1);
                error!(
                    job_id = %request.job_id,
                    exit_code = code,
                    stderr = %stderr_tail,
                    "Manim render failed"
                );
                Err(RenderFailure::ExitCode { code }.into())
            }
            CommandOutcome::Exited {
                elapsed,
                stdout_tail,
                ..
            } => {
                debug!(job_id = %request.job_id, stdout = %stdout_tail, "Manim output");
                let script_stem = request.script_path.file_stem();
                match locate_artifact(&self.config.videos_dir, &request.output_name, script_stem)
                    .await?
                {
                    Some(path) => {
                        info!(
                            job_id = %request.job_id,
                            path = %path.display(),
                            elapsed_secs = elapsed.as_secs_f64(),
                            "Manim render finished"
                        );
                        Ok(path)
                    }
                    None => Err(RenderFailure::MissingOutput.into()),
                }
            }
        }
    }
}

/// Find the rendered file and make sure it ends up at `videos_dir/output_name`.
///
/// Manim writes to `<media>/videos/<script>/<quality>/`, so when the file is
/// not already at the top level it is searched for there and moved up. The
/// per-script media subtree is removed afterwards.
async fn locate_artifact(
    videos_dir: &Path,
    output_name: &str,
    script_stem: Option<&OsStr>,
) -> Result<Option<PathBuf>> {
    let target = videos_dir.join(output_name);
    if tokio::fs::try_exists(&target).await? {
        return Ok(Some(target));
    }

    let media_root = videos_dir.join(MEDIA_VIDEOS_SUBDIR);
    let Some(found) = find_file(&media_root, output_name, MAX_SEARCH_DEPTH).await? else {
        return Ok(None);
    };

    tokio::fs::rename(&found, &target).await?;
    debug!(from = %found.display(), to = %target.display(), "Moved rendered video");

    if let Some(stem) = script_stem {
        let leftovers = media_root.join(stem);
        if let Err(e) = tokio::fs::remove_dir_all(&leftovers).await
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %leftovers.display(), error = %e, "Failed to remove render leftovers");
        }
    }

    Ok(Some(target))
}

async fn find_file(root: &Path, name: &str, max_depth: usize) -> Result<Option<PathBuf>> {
    let mut pending = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if depth < max_depth {
                    pending.push((entry.path(), depth + 1));
                }
            } else if entry.file_name().as_os_str() == OsStr::new(name) {
                return Ok(Some(entry.path()));
            }
        }
    }

    Ok(None)
}
