//! Fire-and-forget side effects dispatched by the resolution service.

/// A side effect that runs independently of the request that produced it.
///
/// Tasks are sent over a bounded channel and executed by
/// [`crate::domain::task_worker::run_task_worker`]. The producing request
/// never waits for, or fails because of, a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundTask {
    /// Write a freshly created mapping into the cache.
    PrimeCache { code: String, target_url: String },

    /// Count a cache-hit resolution in the volatile counter.
    IncrementVolatile { code: String },

    /// Count cache-miss resolutions directly in the durable store.
    IncrementDurable { code: String, delta: i64 },
}

impl BackgroundTask {
    pub fn prime_cache(code: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self::PrimeCache {
            code: code.into(),
            target_url: target_url.into(),
        }
    }

    pub fn increment_volatile(code: impl Into<String>) -> Self {
        Self::IncrementVolatile { code: code.into() }
    }

    pub fn increment_durable(code: impl Into<String>, delta: i64) -> Self {
        Self::IncrementDurable {
            code: code.into(),
            delta,
        }
    }

    /// The short code this task touches.
    pub fn code(&self) -> &str {
        match self {
            Self::PrimeCache { code, .. }
            | Self::IncrementVolatile { code }
            | Self::IncrementDurable { code, .. } => code,
        }
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrimeCache { .. } => "prime_cache",
            Self::IncrementVolatile { .. } => "increment_volatile",
            Self::IncrementDurable { .. } => "increment_durable",
        }
    }
}
