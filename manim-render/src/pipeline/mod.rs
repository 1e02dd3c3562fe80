//! Render pipeline: submission, the worker pool and the external renderer.
//!
//! `RenderPipeline::submit` is the only way jobs enter the store. Workers
//! claim queued jobs, write the scene to a scratch script, run the renderer
//! under a hard timeout and record the terminal state back in the store.

mod processor;
mod renderer;
mod scratch;
mod service;
mod worker_pool;

pub use renderer::{
    ManimRenderer, ManimRendererConfig, RenderFailure, RenderQuality, RenderRequest, Renderer,
    extract_scene_name,
};
pub use service::{DEFAULT_MAX_QUEUED_JOBS, JobSubmission, RenderPipeline, RenderPipelineConfig};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
