//! Cache service trait and error types.

use async_trait::async_trait;
use std::fmt;

/// Key prefix for cached code → URL entries.
pub const URL_KEY_PREFIX: &str = "url:";

/// Key prefix for volatile click counters.
pub const CLICK_KEY_PREFIX: &str = "click:";

/// Default lifetime of a cached resolution entry (24 hours).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Errors that can occur during cache operations.
#[derive(Debug)]
pub enum CacheError {
    ConnectionError(String),
    OperationError(String),
    InvalidData(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConnectionError(e) => write!(f, "Cache connection error: {}", e),
            Self::OperationError(e) => write!(f, "Cache operation error: {}", e),
            Self::InvalidData(e) => write!(f, "Cache returned invalid data: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Fast key-value store for resolution entries and volatile click counters.
///
/// The two kinds of keys live in disjoint namespaces ([`URL_KEY_PREFIX`] and
/// [`CLICK_KEY_PREFIX`]). Resolution entries carry a TTL; counters do not and
/// are only ever removed by [`CacheService::take_clicks`].
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisCache`] - Redis-backed cache
/// - [`crate::infrastructure::cache::InMemoryCache`] - Single-process cache
/// - [`crate::infrastructure::cache::NullCache`] - No-op implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Retrieves the target URL for a short code.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(url))` on cache hit
    /// - `Ok(None)` on cache miss
    ///
    /// # Errors
    ///
    /// Transport failures are returned as errors and must not be reported as
    /// a miss.
    async fn get_url(&self, code: &str) -> CacheResult<Option<String>>;

    /// Stores a URL mapping with an optional TTL in seconds.
    ///
    /// `None` applies the implementation's configured default.
    async fn set_url(&self, code: &str, target_url: &str, ttl_seconds: Option<u64>)
    -> CacheResult<()>;

    /// Increments the volatile click counter for `code`, returning the new value.
    async fn incr_clicks(&self, code: &str) -> CacheResult<i64>;

    /// Returns one page of codes that currently have a volatile counter.
    ///
    /// Start with cursor `0` and continue with the returned cursor until it is
    /// `0` again. `count` is a hint for the page size.
    async fn scan_click_codes(&self, cursor: u64, count: usize) -> CacheResult<(u64, Vec<String>)>;

    /// Atomically reads and deletes the volatile counter for `code`.
    ///
    /// Returns `Ok(None)` if no counter exists. An increment racing with this
    /// call is either included in the returned value or survives in a fresh
    /// counter, never both and never neither.
    async fn take_clicks(&self, code: &str) -> CacheResult<Option<i64>>;

    /// Checks if the cache backend is healthy.
    async fn health_check(&self) -> bool;
}
