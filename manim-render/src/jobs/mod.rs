//! Render job model and the in-memory job store.

mod metrics;
mod model;
mod store;

pub use metrics::{JobMetrics, PollingStrategy};
pub use model::{HistoryRecord, Job, JobStatus, JobUpdate};
pub use store::{
    DEFAULT_RENDER_ESTIMATE, HISTORY_CAPACITY, HISTORY_RETENTION_FACTOR, JobStore, JobStoreConfig,
    METRICS_CACHE_TTL,
};
