//! Sliding-window request throttling per client and endpoint.
//!
//! Each `(client, endpoint)` pair owns an ordered list of admission
//! timestamps. A request is admitted when fewer than `limit` timestamps fall
//! inside the trailing window. Expired timestamps are dropped lazily on each
//! check; keys whose windows have emptied are removed by [`RateLimiter::sweep`].

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

/// Admission limit for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests admitted per window.
    pub limit: u32,
    /// Trailing window length.
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub const fn per_minutes(limit: u32, minutes: u64) -> Self {
        Self::new(limit, Duration::from_secs(minutes * 60))
    }
}

/// Per-endpoint limits with a fallback for unlisted endpoints.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub default_limit: RateLimit,
    pub endpoint_limits: HashMap<String, RateLimit>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        let endpoint_limits = [
            ("/api/lesson", RateLimit::per_minutes(5, 5)),
            ("/api/example", RateLimit::per_minutes(5, 5)),
            ("/api/manim", RateLimit::per_minutes(3, 5)),
            ("/api/render", RateLimit::per_minutes(2, 10)),
            ("/api/render/{job_id}", RateLimit::per_minutes(120, 1)),
        ]
        .into_iter()
        .map(|(endpoint, limit)| (endpoint.to_string(), limit))
        .collect();

        Self {
            default_limit: RateLimit::per_minutes(10, 5),
            endpoint_limits,
        }
    }
}

impl RateLimiterConfig {
    /// Override (or add) the limit for one endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, limit: RateLimit) -> Self {
        self.endpoint_limits.insert(endpoint.into(), limit);
        self
    }

    pub fn with_default(mut self, limit: RateLimit) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn limit_for(&self, endpoint: &str) -> RateLimit {
        self.endpoint_limits
            .get(endpoint)
            .copied()
            .unwrap_or(self.default_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    client: String,
    endpoint: String,
}

/// Shared sliding-window limiter.
///
/// Windows are sharded through a `DashMap`, so checks for different keys do
/// not contend and checks for the same key are serialized.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: DashMap<WindowKey, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Admit or reject one request for `(client, endpoint)`.
    ///
    /// Admission records the current instant; rejection records nothing.
    pub fn allow(&self, client: &str, endpoint: &str, limit: u32, window: Duration) -> bool {
        self.allow_at(client, endpoint, limit, window, Instant::now())
    }

    /// [`allow`](Self::allow) evaluated at an explicit instant.
    pub fn allow_at(
        &self,
        client: &str,
        endpoint: &str,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> bool {
        let key = WindowKey {
            client: client.to_string(),
            endpoint: endpoint.to_string(),
        };
        let mut entry = self.windows.entry(key).or_default();
        let timestamps = entry.value_mut();

        while timestamps
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) > window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= limit as usize {
            warn!(
                client = %client,
                endpoint = %endpoint,
                limit,
                window_secs = window.as_secs(),
                "Rate limit exceeded"
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Check `(client, endpoint)` against the configured limit table.
    ///
    /// Returns the applied limit as the error when the request is rejected.
    pub fn check(&self, client: &str, endpoint: &str) -> std::result::Result<(), RateLimit> {
        let limit = self.config.limit_for(endpoint);
        if self.allow(client, endpoint, limit.limit, limit.window) {
            Ok(())
        } else {
            Err(limit)
        }
    }

    /// Drop timestamps older than `max_age` and remove keys left empty.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_at(max_age, Instant::now())
    }

    pub fn sweep_at(&self, max_age: Duration, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            timestamps.retain(|ts| now.saturating_duration_since(*ts) <= max_age);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Swept idle rate-limit windows");
        }
        removed
    }

    /// Number of tracked `(client, endpoint)` keys.
    pub fn active_keys(&self) -> usize {
        self.windows.len()
    }
}
