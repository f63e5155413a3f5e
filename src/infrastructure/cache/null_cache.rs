//! No-op cache implementation for disabled caching.

use super::service::{CacheResult, CacheService};
use async_trait::async_trait;
use tracing::debug;

/// A cache implementation that does nothing.
///
/// Every lookup is a miss, so every resolution reads the durable store and
/// records its click there directly. Counter increments are discarded and the
/// counter keyspace is always empty.
///
/// # Use Cases
///
/// - Fallback when the Redis connection fails at startup
/// - Testing scenarios where caching should be bypassed
pub struct NullCache;

impl NullCache {
    /// Creates a new NullCache instance.
    pub fn new() -> Self {
        debug!("Using NullCache (caching disabled)");
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheService for NullCache {
    async fn get_url(&self, _code: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set_url(
        &self,
        _code: &str,
        _target_url: &str,
        _ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        Ok(())
    }

    async fn incr_clicks(&self, _code: &str) -> CacheResult<i64> {
        Ok(0)
    }

    async fn scan_click_codes(&self, _cursor: u64, _count: usize) -> CacheResult<(u64, Vec<String>)> {
        Ok((0, Vec::new()))
    }

    async fn take_clicks(&self, _code: &str) -> CacheResult<Option<i64>> {
        Ok(None)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
