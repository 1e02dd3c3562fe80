//! HTTP surface: render submission, status polling, monitoring and health.

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
