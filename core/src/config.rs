use std::time::Duration;

/// Sizing and timing for the search cache.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Maximum number of distinct terms held before least-recently-used eviction.
    pub capacity: usize,
    /// Entries older than this are dropped regardless of use.
    pub expire_after_write: Duration,
    /// Entries older than this are served stale while one background refresh runs.
    pub refresh_after_write: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            capacity: 50_000,
            expire_after_write: Duration::from_secs(24 * 60 * 60),
            refresh_after_write: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub default_limit: usize,
    /// Upper bound on a requested page size. `None` honours any limit.
    pub max_limit: Option<usize>,
    pub request_timeout: Duration,
    /// Candidate sets at least this large are ranked on the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: 25,
            max_limit: None,
            request_timeout: Duration::from_secs(10),
            parallel_threshold: 4096,
        }
    }
}

impl FeedConfig {
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        let limit = requested.unwrap_or(self.default_limit);
        self.max_limit.map_or(limit, |max| limit.min(max))
    }
}
