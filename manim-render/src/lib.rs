//! manim-render library crate.
//!
//! Accepts Manim scene source over HTTP, screens it, and renders accepted
//! scenes to video on a bounded worker pool. Job state lives in an in-memory
//! store that also keeps a bounded completion history for monitoring.

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod rate_limit;
pub mod retention;
pub mod safety;
pub mod services;

pub use error::{Error, Result};
