//! Background execution of fire-and-forget tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

use crate::domain::background_task::BackgroundTask;
use crate::domain::repositories::{LinkRepository, StoreError};
use crate::infrastructure::cache::{CacheError, CacheService};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Executes [`BackgroundTask`]s against the cache and durable store.
///
/// Every store call is bounded by `store_timeout`. Failed tasks are retried up
/// to `retry_attempts` times with exponential backoff, except where a retry
/// could count a click twice:
///
/// - volatile increments are never retried
/// - durable increments are not retried after a timeout, since the update
///   may already have committed
///
/// Cache priming is idempotent and is retried on any failure.
pub struct TaskExecutor<L: LinkRepository> {
    cache: Arc<dyn CacheService>,
    links: Arc<L>,
    store_timeout: Duration,
    retry_attempts: usize,
}

impl<L: LinkRepository> TaskExecutor<L> {
    pub fn new(
        cache: Arc<dyn CacheService>,
        links: Arc<L>,
        store_timeout: Duration,
        retry_attempts: usize,
    ) -> Self {
        Self {
            cache,
            links,
            store_timeout,
            retry_attempts,
        }
    }

    /// Runs a single task to completion and logs its outcome.
    ///
    /// Returns `true` if the task took effect. Failures are absorbed here.
    pub async fn execute(&self, task: BackgroundTask) -> bool {
        let kind = task.kind();
        let result = match &task {
            BackgroundTask::PrimeCache { code, target_url } => {
                self.with_retry(|| self.prime_cache(code, target_url), |_| true)
                    .await
                    .map(|_| true)
            }
            BackgroundTask::IncrementVolatile { code } => {
                self.increment_volatile(code).await.map(|_| true)
            }
            BackgroundTask::IncrementDurable { code, delta } => {
                self.with_retry(
                    || self.increment_durable(code, *delta),
                    |e: &TaskError| !matches!(e, TaskError::Timeout(_)),
                )
                .await
            }
        };

        match result {
            Ok(true) => {
                debug!(task = kind, code = %task.code(), "Background task completed");
                true
            }
            Ok(false) => {
                warn!(task = kind, code = %task.code(), "Background task matched no link");
                false
            }
            Err(e) => {
                warn!(task = kind, code = %task.code(), error = %e, "Background task failed");
                metrics::counter!("linkcache_tasks_failed_total", "task" => kind).increment(1);
                false
            }
        }
    }

    async fn with_retry<T, F, Fut, C>(&self, action: F, retryable: C) -> Result<T, TaskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
        C: FnMut(&TaskError) -> bool,
    {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(25)
            .max_delay(Duration::from_secs(1))
            .map(jitter)
            .take(self.retry_attempts);

        RetryIf::spawn(strategy, action, retryable).await
    }

    async fn prime_cache(&self, code: &str, target_url: &str) -> Result<(), TaskError> {
        timeout(self.store_timeout, self.cache.set_url(code, target_url, None))
            .await
            .map_err(|_| TaskError::Timeout(self.store_timeout))??;
        Ok(())
    }

    async fn increment_volatile(&self, code: &str) -> Result<i64, TaskError> {
        let count = timeout(self.store_timeout, self.cache.incr_clicks(code))
            .await
            .map_err(|_| TaskError::Timeout(self.store_timeout))??;
        Ok(count)
    }

    async fn increment_durable(&self, code: &str, delta: i64) -> Result<bool, TaskError> {
        let updated = timeout(self.store_timeout, self.links.increment_clicks(code, delta))
            .await
            .map_err(|_| TaskError::Timeout(self.store_timeout))??;
        Ok(updated)
    }
}

/// Drains the task channel, running up to `concurrency` tasks at once.
///
/// Returns once every sender has been dropped and all in-flight tasks have
/// finished.
pub async fn run_task_worker<L>(
    mut rx: mpsc::Receiver<BackgroundTask>,
    executor: Arc<TaskExecutor<L>>,
    concurrency: usize,
) where
    L: LinkRepository + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut in_flight = JoinSet::new();

    info!(concurrency, "Task worker started");

    while let Some(task) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let executor = executor.clone();
        in_flight.spawn(async move {
            executor.execute(task).await;
            drop(permit);
        });

        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}

    info!("Task worker stopped");
}
