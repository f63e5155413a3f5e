//! Redis-backed cache implementation.

use super::service::{
    CLICK_KEY_PREFIX, CacheError, CacheResult, CacheService, URL_KEY_PREFIX,
};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Reads a counter and deletes it in one server-side step.
///
/// Returns nil when the key does not exist.
static TAKE_CLICKS_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local v = redis.call("GET", KEYS[1])
if not v then
  return false
end
redis.call("DEL", KEYS[1])
return v
"#,
    )
});

/// Redis cache implementation for URL lookups and click counters.
///
/// Uses connection pooling via `ConnectionManager` for efficient connection reuse.
/// Errors are logged and returned; callers decide whether they are fatal.
pub struct RedisCache {
    client: ConnectionManager,
    default_ttl: u64,
}

fn operation_error(operation: &str, err: redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        CacheError::ConnectionError(format!("{operation}: {err}"))
    } else {
        CacheError::OperationError(format!("{operation}: {err}"))
    }
}

impl RedisCache {
    /// Connects to Redis, validates the connection with a PING, and configures the default TTL.
    ///
    /// # Arguments
    ///
    /// - `redis_url` - Redis connection string (e.g., `"redis://localhost:6379"`)
    /// - `default_ttl_seconds` - TTL applied to cached entries when [`CacheService::set_url`]
    ///   is called with `ttl_seconds = None`; controlled via `CACHE_TTL_SECONDS` env var
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionError`] if the URL is invalid, the connection cannot
    /// be established, or the PING health check fails.
    pub async fn connect(redis_url: &str, default_ttl_seconds: u64) -> CacheResult<Self> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut test_conn = manager.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {}", e)))?;

        info!("✓ Connected to Redis");

        Ok(Self {
            client: manager,
            default_ttl: default_ttl_seconds,
        })
    }

    fn url_key(code: &str) -> String {
        format!("{}{}", URL_KEY_PREFIX, code)
    }

    fn click_key(code: &str) -> String {
        format!("{}{}", CLICK_KEY_PREFIX, code)
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get_url(&self, code: &str) -> CacheResult<Option<String>> {
        let key = Self::url_key(code);
        let mut conn = self.client.clone();

        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(url)) => {
                debug!(code = %code, "Cache HIT");
                Ok(Some(url))
            }
            Ok(None) => {
                debug!(code = %code, "Cache MISS");
                Ok(None)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Redis GET error");
                Err(operation_error("GET", e))
            }
        }
    }

    async fn set_url(
        &self,
        code: &str,
        target_url: &str,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        let key = Self::url_key(code);
        let mut conn = self.client.clone();
        let ttl_seconds = ttl_seconds.unwrap_or(self.default_ttl);

        conn.set_ex::<_, _, ()>(&key, target_url, ttl_seconds)
            .await
            .map_err(|e| operation_error("SET", e))?;

        debug!(code = %code, ttl_seconds, "Cache SET");
        Ok(())
    }

    async fn incr_clicks(&self, code: &str) -> CacheResult<i64> {
        let key = Self::click_key(code);
        let mut conn = self.client.clone();

        let count: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| operation_error("INCR", e))?;

        Ok(count)
    }

    async fn scan_click_codes(&self, cursor: u64, count: usize) -> CacheResult<(u64, Vec<String>)> {
        let pattern = format!("{}*", CLICK_KEY_PREFIX);
        let mut conn = self.client.clone();

        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| operation_error("SCAN", e))?;

        let codes = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(CLICK_KEY_PREFIX).map(str::to_owned))
            .collect();

        Ok((next_cursor, codes))
    }

    async fn take_clicks(&self, code: &str) -> CacheResult<Option<i64>> {
        let key = Self::click_key(code);
        let mut conn = self.client.clone();

        let value: Option<String> = TAKE_CLICKS_SCRIPT
            .key(&key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| operation_error("EVALSHA take_clicks", e))?;

        value
            .map(|raw| {
                raw.parse::<i64>().map_err(|e| {
                    CacheError::InvalidData(format!("counter '{key}' holds '{raw}': {e}"))
                })
            })
            .transpose()
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.client.clone();
        conn.ping::<()>().await.is_ok()
    }
}
