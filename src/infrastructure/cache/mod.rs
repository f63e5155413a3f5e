//! Caching layer for fast redirect lookups and volatile click counters.
//!
//! Provides a [`CacheService`] trait with three implementations:
//! - [`RedisCache`] - Production Redis-backed cache
//! - [`InMemoryCache`] - Single-process cache for development and tests
//! - [`NullCache`] - No-op implementation for disabled caching

mod memory_cache;
mod null_cache;
mod redis_cache;
mod service;

pub use memory_cache::InMemoryCache;
pub use null_cache::NullCache;
pub use redis_cache::RedisCache;
pub use service::{
    CLICK_KEY_PREFIX, CacheError, CacheResult, CacheService, DEFAULT_CACHE_TTL_SECONDS,
    URL_KEY_PREFIX,
};

#[cfg(test)]
pub use service::MockCacheService;
