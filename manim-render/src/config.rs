//! Environment-driven application configuration.
//!
//! Every setting has a default; a variable that is set but invalid is a
//! configuration error rather than being silently ignored.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::server::ApiServerConfig;
use crate::health::HealthConfig;
use crate::logging::{LogFormat, LoggingSettings};
use crate::pipeline::{DEFAULT_MAX_QUEUED_JOBS, RenderQuality, WorkerPoolConfig};
use crate::retention::RetentionConfig;
use crate::{Error, Result};

/// Settings for the external renderer and the pool that drives it.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub command: String,
    pub quality: RenderQuality,
    pub timeout: Duration,
    pub workers: WorkerPoolConfig,
    pub max_queued_jobs: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            command: "manim".to_string(),
            quality: RenderQuality::default(),
            timeout: Duration::from_secs(180),
            workers: WorkerPoolConfig::default(),
            max_queued_jobs: DEFAULT_MAX_QUEUED_JOBS,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    pub render: RenderSettings,
    /// Root of `code/` (scratch scripts) and `videos/` (rendered output).
    pub data_dir: PathBuf,
    pub retention: RetentionConfig,
    pub health: HealthConfig,
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            render: RenderSettings::default(),
            data_dir: PathBuf::from("./storage"),
            retention: RetentionConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// Supported variables: `HOST`, `PORT`, `ALLOWED_ORIGINS`,
    /// `MANIM_QUALITY`, `RENDER_TIMEOUT_SEC`, `MANIM_COMMAND`, `DATA_DIR`,
    /// `RENDER_WORKERS`, `MAX_QUEUED_JOBS`, `LOG_DIR`, `LOG_FORMAT`,
    /// `JOB_MAX_AGE_HOURS`, `CLEANUP_INTERVAL_SECS`,
    /// `STUCK_JOB_THRESHOLD_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(host) = env.get("HOST") {
            config.server.bind_address = host;
        }
        config.server.port = env.parse("PORT", config.server.port)?;
        if let Some(origins) = env.get("ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.render.quality = env.parse("MANIM_QUALITY", config.render.quality)?;
        let timeout_secs = env.positive("RENDER_TIMEOUT_SEC", config.render.timeout.as_secs())?;
        config.render.timeout = Duration::from_secs(timeout_secs);
        if let Some(command) = env.get("MANIM_COMMAND") {
            config.render.command = command;
        }
        config.render.workers.max_workers =
            env.positive("RENDER_WORKERS", config.render.workers.max_workers)?;
        config.render.max_queued_jobs =
            env.positive("MAX_QUEUED_JOBS", config.render.max_queued_jobs)?;

        if let Some(dir) = env.get("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.retention.max_age_hours =
            env.positive("JOB_MAX_AGE_HOURS", config.retention.max_age_hours)?;
        config.retention.check_interval_secs =
            env.positive("CLEANUP_INTERVAL_SECS", config.retention.check_interval_secs)?;
        config.health.stuck_job_threshold_secs = env.positive(
            "STUCK_JOB_THRESHOLD_SECS",
            config.health.stuck_job_threshold_secs,
        )?;

        config.logging.log_dir = env.get("LOG_DIR").map(PathBuf::from);
        config.logging.format = env.parse("LOG_FORMAT", LogFormat::default())?;

        Ok(config)
    }

    /// Directory for scratch scene scripts.
    pub fn code_dir(&self) -> PathBuf {
        self.data_dir.join("code")
    }

    /// Directory for rendered videos, served under `/static/videos`.
    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("videos")
    }
}

/// Variable lookup that treats blank values as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::config(format!("{key}={raw} is invalid: {e}"))),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr + PartialOrd + Default + Display,
        T::Err: Display,
    {
        let value = self.parse(key, default)?;
        if value <= T::default() {
            return Err(Error::config(format!("{key} must be greater than zero, got {value}")));
        }
        Ok(value)
    }
}
