//! In-process cache implementation.

use super::service::{CacheResult, CacheService};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A cache held in the memory of a single process.
///
/// Used when no Redis instance is configured and in tests. Counter updates
/// and extraction lock the owning shard, so [`CacheService::take_clicks`] is
/// atomic with respect to [`CacheService::incr_clicks`].
///
/// Each counter key gets a sequence number when it is created, and a scan
/// cursor is the next sequence number to return. Removing keys never moves
/// the others, so a key present for a whole walk is returned exactly once.
/// A key created during a walk may or may not be seen, as with Redis `SCAN`.
pub struct InMemoryCache {
    urls: DashMap<String, (String, Instant)>,
    clicks: DashMap<String, Counter>,
    next_seq: AtomicU64,
    default_ttl: Duration,
}

struct Counter {
    seq: u64,
    count: i64,
}

impl InMemoryCache {
    /// Creates an empty cache with the given default entry lifetime.
    pub fn new(default_ttl_seconds: u64) -> Self {
        debug!("Using InMemoryCache");
        Self {
            urls: DashMap::new(),
            clicks: DashMap::new(),
            next_seq: AtomicU64::new(1),
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    /// Current value of a volatile counter without clearing it.
    pub fn peek_clicks(&self, code: &str) -> Option<i64> {
        self.clicks.get(code).map(|counter| counter.count)
    }

    /// Synchronous form of [`CacheService::incr_clicks`].
    pub fn record_click(&self, code: &str) -> i64 {
        let mut counter = self.clicks.entry(code.to_string()).or_insert_with(|| Counter {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            count: 0,
        });
        counter.count += 1;
        counter.count
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get_url(&self, code: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();

        if let Some(entry) = self.urls.get(code) {
            let (url, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(url.clone()));
            }
        }

        self.urls.remove_if(code, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set_url(
        &self,
        code: &str,
        target_url: &str,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        let ttl = ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl);

        self.urls
            .insert(code.to_string(), (target_url.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn incr_clicks(&self, code: &str) -> CacheResult<i64> {
        Ok(self.record_click(code))
    }

    async fn scan_click_codes(&self, cursor: u64, count: usize) -> CacheResult<(u64, Vec<String>)> {
        let mut remaining: Vec<(u64, String)> = self
            .clicks
            .iter()
            .filter(|entry| entry.seq >= cursor)
            .map(|entry| (entry.seq, entry.key().clone()))
            .collect();
        remaining.sort_unstable();

        let page_len = count.max(1);
        let next_cursor = match remaining.get(page_len) {
            Some((seq, _)) => *seq,
            None => 0,
        };

        let codes = remaining
            .into_iter()
            .take(page_len)
            .map(|(_, code)| code)
            .collect();

        Ok((next_cursor, codes))
    }

    async fn take_clicks(&self, code: &str) -> CacheResult<Option<i64>> {
        Ok(self.clicks.remove(code).map(|(_, counter)| counter.count))
    }

    async fn health_check(&self) -> bool {
        true
    }
}
