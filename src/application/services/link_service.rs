//! Link creation and resolution service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as Ttl;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::background_task::BackgroundTask;
use crate::domain::entities::{Link, NewLink, NewLinkError};
use crate::domain::repositories::{LinkRepository, StoreError};
use crate::error::{AppError, ResolveStage};
use crate::infrastructure::cache::CacheService;
use crate::utils::code_generator::{CodeGenerator, validate_custom_code};

/// Tuning knobs for [`LinkService`].
#[derive(Debug, Clone, Copy)]
pub struct LinkServiceSettings {
    /// Length of generated codes.
    pub code_length: usize,
    /// Bound on each store call made while creating a link.
    pub create_timeout: Duration,
    /// Bound on each store call made while resolving a code.
    pub resolve_timeout: Duration,
    /// Generated codes tried before giving up with [`AppError::CreateFailed`].
    pub max_create_attempts: usize,
}

impl Default for LinkServiceSettings {
    fn default() -> Self {
        Self {
            code_length: 7,
            create_timeout: Duration::from_secs(5),
            resolve_timeout: Duration::from_secs(3),
            max_create_attempts: 5,
        }
    }
}

/// Creates short links and resolves codes with cache-aside reads.
///
/// The durable store is written first and is the source of truth. The cache
/// is an optimization: priming it and counting clicks are queued as
/// [`BackgroundTask`]s and never fail or delay the calling request.
pub struct LinkService<L: LinkRepository> {
    links: Arc<L>,
    cache: Arc<dyn CacheService>,
    generator: Arc<dyn CodeGenerator>,
    tasks: mpsc::Sender<BackgroundTask>,
    settings: LinkServiceSettings,
}

impl<L: LinkRepository> LinkService<L> {
    /// Creates a new link service.
    pub fn new(
        links: Arc<L>,
        cache: Arc<dyn CacheService>,
        generator: Arc<dyn CodeGenerator>,
        tasks: mpsc::Sender<BackgroundTask>,
        settings: LinkServiceSettings,
    ) -> Self {
        Self {
            links,
            cache,
            generator,
            tasks,
            settings,
        }
    }

    /// Creates a short link with the default lifetime.
    ///
    /// See [`Self::create_with_ttl`].
    pub async fn create(
        &self,
        target_url: String,
        custom_code: Option<String>,
    ) -> Result<Link, AppError> {
        self.create_with_ttl(target_url, custom_code, None).await
    }

    /// Creates a short link.
    ///
    /// # Code Assignment
    ///
    /// - A `custom_code` is validated and inserted exactly once
    /// - Otherwise a random code is generated and inserted, regenerating on
    ///   collision up to `max_create_attempts` times
    ///
    /// On success the new mapping is queued for cache priming.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] for a malformed target, custom code or TTL
    /// - [`AppError::AliasTaken`] if the custom code is already in use
    /// - [`AppError::CreateFailed`] if every generated code collided
    /// - [`AppError::Internal`] on store failure, timeout or missing entropy
    pub async fn create_with_ttl(
        &self,
        target_url: String,
        custom_code: Option<String>,
        ttl: Option<Ttl>,
    ) -> Result<Link, AppError> {
        let link = match custom_code {
            Some(code) => {
                validate_custom_code(&code)?;
                let new_link = NewLink::new(code, target_url, ttl).map_err(invalid_link)?;

                match self.insert(new_link).await? {
                    Ok(link) => link,
                    Err(code) => return Err(AppError::alias_taken(code)),
                }
            }
            None => self.insert_generated(target_url, ttl).await?,
        };

        self.enqueue(BackgroundTask::prime_cache(&link.code, &link.target_url));

        Ok(link)
    }

    async fn insert_generated(&self, target_url: String, ttl: Option<Ttl>) -> Result<Link, AppError> {
        let attempts = self.settings.max_create_attempts.max(1);
        let mut template = NewLink::new(self.generate_code()?, target_url, ttl).map_err(invalid_link)?;

        for attempt in 1..=attempts {
            match self.insert(template.clone()).await? {
                Ok(link) => return Ok(link),
                Err(code) => {
                    debug!(code = %code, attempt, "Generated code collided, regenerating");
                }
            }

            if attempt < attempts {
                template = template.with_code(self.generate_code()?);
            }
        }

        warn!(attempts, "Exhausted attempts to allocate a unique code");
        Err(AppError::CreateFailed { attempts })
    }

    /// Inserts under the create timeout.
    ///
    /// The inner `Err` carries the code that collided.
    async fn insert(&self, new_link: NewLink) -> Result<Result<Link, String>, AppError> {
        let limit = self.settings.create_timeout;

        match timeout(limit, self.links.insert(new_link)).await {
            Ok(Ok(link)) => Ok(Ok(link)),
            Ok(Err(StoreError::DuplicateCode(code))) => Ok(Err(code)),
            Ok(Err(e)) => Err(AppError::internal(
                "Failed to store short link",
                json!({ "reason": e.to_string() }),
            )),
            Err(_) => Err(AppError::internal(
                "Timed out storing short link",
                json!({ "timeout_ms": limit.as_millis() as u64 }),
            )),
        }
    }

    fn generate_code(&self) -> Result<String, AppError> {
        self.generator
            .generate(self.settings.code_length)
            .map_err(|e| {
                AppError::internal(
                    "Failed to generate short code",
                    json!({ "reason": e.to_string() }),
                )
            })
    }

    /// Resolves a code to its target URL, cache first.
    ///
    /// A cache hit queues a volatile click. A miss falls through to
    /// [`Self::resolve_from_store`].
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the code does not exist durably
    /// - [`AppError::ResolveFailed`] with [`ResolveStage::Cache`] if the cache
    ///   errored or timed out; the cache error is never treated as a miss
    /// - [`AppError::ResolveFailed`] with [`ResolveStage::Store`] if the
    ///   durable read failed
    pub async fn resolve(&self, code: &str) -> Result<String, AppError> {
        let limit = self.settings.resolve_timeout;

        let cached = match timeout(limit, self.cache.get_url(code)).await {
            Ok(Ok(cached)) => cached,
            Ok(Err(e)) => {
                metrics::counter!("linkcache_resolve_total", "outcome" => "cache_error").increment(1);
                return Err(AppError::resolve_failed(code, ResolveStage::Cache, e));
            }
            Err(_) => {
                metrics::counter!("linkcache_resolve_total", "outcome" => "cache_error").increment(1);
                return Err(AppError::resolve_failed(
                    code,
                    ResolveStage::Cache,
                    format!("timed out after {limit:?}"),
                ));
            }
        };

        if let Some(target_url) = cached {
            metrics::counter!("linkcache_resolve_total", "outcome" => "hit").increment(1);
            self.enqueue(BackgroundTask::increment_volatile(code));
            return Ok(target_url);
        }

        self.resolve_from_store(code).await
    }

    /// Resolves a code from the durable store only.
    ///
    /// Repopulates the cache best-effort and queues a durable click. Used for
    /// cache misses and as the fallback when the cache is unreachable.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub async fn resolve_from_store(&self, code: &str) -> Result<String, AppError> {
        let limit = self.settings.resolve_timeout;

        let link = match timeout(limit, self.links.find_by_code(code)).await {
            Ok(Ok(Some(link))) => link,
            Ok(Ok(None)) => {
                metrics::counter!("linkcache_resolve_total", "outcome" => "not_found").increment(1);
                return Err(AppError::not_found(code));
            }
            Ok(Err(e)) => {
                metrics::counter!("linkcache_resolve_total", "outcome" => "store_error").increment(1);
                return Err(AppError::resolve_failed(code, ResolveStage::Store, e));
            }
            Err(_) => {
                metrics::counter!("linkcache_resolve_total", "outcome" => "store_error").increment(1);
                return Err(AppError::resolve_failed(
                    code,
                    ResolveStage::Store,
                    format!("timed out after {limit:?}"),
                ));
            }
        };

        metrics::counter!("linkcache_resolve_total", "outcome" => "miss").increment(1);

        match timeout(limit, self.cache.set_url(code, &link.target_url, None)).await {
            Ok(Ok(())) => debug!(code = %code, "Repopulated cache"),
            Ok(Err(e)) => warn!(code = %code, error = %e, "Failed to repopulate cache"),
            Err(_) => warn!(code = %code, "Timed out repopulating cache"),
        }

        self.enqueue(BackgroundTask::increment_durable(code, 1));

        Ok(link.target_url)
    }

    /// Hands a task to the background worker without waiting.
    ///
    /// Returns `false` if the queue was full or closed and the task was dropped.
    pub fn enqueue(&self, task: BackgroundTask) -> bool {
        match self.tasks.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                warn!(task = task.kind(), code = %task.code(), "Task queue full, dropping task");
                metrics::counter!("linkcache_tasks_dropped_total").increment(1);
                false
            }
            Err(TrySendError::Closed(task)) => {
                warn!(task = task.kind(), code = %task.code(), "Task queue closed, dropping task");
                metrics::counter!("linkcache_tasks_dropped_total").increment(1);
                false
            }
        }
    }

    /// Constructs the full short URL from a base URL and code.
    pub fn short_url(&self, base_url: &str, code: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), code)
    }
}

fn invalid_link(e: NewLinkError) -> AppError {
    let field = match e {
        NewLinkError::CodeTooShort => "custom_alias",
        NewLinkError::TargetUrl(_) => "url",
        NewLinkError::TtlTooLong => "ttl_seconds",
    };

    AppError::bad_request(e.to_string(), json!({ "field": field }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::click_flusher::{ClickFlusher, FlusherSettings};
    use crate::domain::repositories::MockLinkRepository;
    use crate::domain::task_worker::{TaskExecutor, run_task_worker};
    use crate::infrastructure::cache::{CacheError, InMemoryCache, MockCacheService};
    use crate::utils::code_generator::{CodeGenError, MockCodeGenerator};
    use chrono::Utc;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::task::JoinSet;

    const HITS: i64 = 200;

    fn stored(new_link: NewLink) -> Link {
        Link::new(
            new_link.code,
            new_link.target_url,
            new_link.created_at,
            new_link.expires_at,
            0,
        )
    }

    fn existing(code: &str, url: &str) -> Link {
        let now = Utc::now();
        Link::new(code.to_string(), url.to_string(), now, now + Ttl::hours(24), 0)
    }

    fn generator_yielding(codes: &[&str]) -> MockCodeGenerator {
        let mut codes: Vec<String> = codes.iter().rev().map(|c| c.to_string()).collect();
        let mut generator = MockCodeGenerator::new();
        generator
            .expect_generate()
            .returning(move |_| Ok(codes.pop().unwrap_or_else(|| "zzzzzzz".to_string())));
        generator
    }

    fn service(
        links: MockLinkRepository,
        cache: Arc<dyn CacheService>,
        generator: MockCodeGenerator,
        capacity: usize,
    ) -> (LinkService<MockLinkRepository>, mpsc::Receiver<BackgroundTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        let service = LinkService::new(
            Arc::new(links),
            cache,
            Arc::new(generator),
            tx,
            LinkServiceSettings::default(),
        );
        (service, rx)
    }

    #[tokio::test]
    async fn test_create_generated_code_and_prime_cache() {
        let mut links = MockLinkRepository::new();
        links
            .expect_insert()
            .withf(|new_link| new_link.code == "c1c1c1c" && new_link.target_url == "https://example.com/a")
            .times(1)
            .returning(|new_link| Ok(stored(new_link)));

        let (service, mut rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            generator_yielding(&["c1c1c1c"]),
            8,
        );

        let link = service
            .create("https://example.com/a".to_string(), None)
            .await
            .unwrap();

        assert_eq!(link.code, "c1c1c1c");
        assert_eq!(
            rx.try_recv().unwrap(),
            BackgroundTask::prime_cache("c1c1c1c", "https://example.com/a")
        );
    }

    #[tokio::test]
    async fn test_create_retries_on_collision() {
        let mut links = MockLinkRepository::new();
        let mut calls = 0;
        links.expect_insert().times(3).returning(move |new_link| {
            calls += 1;
            if calls < 3 {
                Err(StoreError::DuplicateCode(new_link.code))
            } else {
                Ok(stored(new_link))
            }
        });

        let (service, _rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            generator_yielding(&["aaaa111", "bbbb222", "cccc333"]),
            8,
        );

        let link = service
            .create("https://example.com".to_string(), None)
            .await
            .unwrap();

        assert_eq!(link.code, "cccc333");
    }

    #[tokio::test]
    async fn test_create_fails_after_max_attempts() {
        let mut links = MockLinkRepository::new();
        links
            .expect_insert()
            .times(5)
            .returning(|new_link| Err(StoreError::DuplicateCode(new_link.code)));

        let (service, mut rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            generator_yielding(&[]),
            8,
        );

        let result = service
            .create("https://example.com".to_string(), None)
            .await;

        assert!(matches!(result, Err(AppError::CreateFailed { attempts: 5 })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_custom_code_taken() {
        let mut links = MockLinkRepository::new();
        links
            .expect_insert()
            .withf(|new_link| new_link.code == "c1c1")
            .times(1)
            .returning(|new_link| Err(StoreError::DuplicateCode(new_link.code)));

        let mut generator = MockCodeGenerator::new();
        generator.expect_generate().times(0);

        let (service, _rx) = service(links, Arc::new(InMemoryCache::new(60)), generator, 8);

        let result = service
            .create("https://x.com".to_string(), Some("c1c1".to_string()))
            .await;

        match result {
            Err(AppError::AliasTaken { code }) => assert_eq!(code, "c1c1"),
            other => panic!("expected AliasTaken, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_custom_code() {
        let mut links = MockLinkRepository::new();
        links.expect_insert().times(0);

        let (service, _rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            MockCodeGenerator::new(),
            8,
        );

        let result = service
            .create("https://example.com".to_string(), Some("a b".to_string()))
            .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_ttl_above_maximum() {
        let mut links = MockLinkRepository::new();
        links.expect_insert().times(0);

        let (service, _rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            generator_yielding(&["abcdefg"]),
            8,
        );

        let result = service
            .create_with_ttl("https://example.com".to_string(), None, Some(Ttl::days(31)))
            .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_create_applies_requested_ttl() {
        let mut links = MockLinkRepository::new();
        links
            .expect_insert()
            .withf(|new_link| new_link.expires_at - new_link.created_at == Ttl::hours(2))
            .times(1)
            .returning(|new_link| Ok(stored(new_link)));

        let (service, _rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            generator_yielding(&["abcdefg"]),
            8,
        );

        assert!(
            service
                .create_with_ttl("https://example.com".to_string(), None, Some(Ttl::hours(2)))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_create_fails_without_entropy() {
        let mut generator = MockCodeGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(CodeGenError::EntropyUnavailable("no device".to_string())));

        let mut links = MockLinkRepository::new();
        links.expect_insert().times(0);

        let (service, _rx) = service(links, Arc::new(InMemoryCache::new(60)), generator, 8);

        let result = service
            .create("https://example.com".to_string(), None)
            .await;

        assert!(matches!(result, Err(AppError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_create_succeeds_when_task_queue_is_full() {
        let mut links = MockLinkRepository::new();
        links
            .expect_insert()
            .returning(|new_link| Ok(stored(new_link)));

        let (service, _rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            generator_yielding(&["first01", "second2"]),
            1,
        );

        service
            .create("https://example.com/1".to_string(), None)
            .await
            .unwrap();
        let second = service
            .create("https://example.com/2".to_string(), None)
            .await;

        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_miss_then_hit() {
        let mut links = MockLinkRepository::new();
        links
            .expect_find_by_code()
            .times(1)
            .returning(|code| Ok(Some(existing(code, "https://example.com/a"))));

        let cache = Arc::new(InMemoryCache::new(60));
        let (service, mut rx) = service(links, cache.clone(), MockCodeGenerator::new(), 8);

        let first = service.resolve("c1c1").await.unwrap();
        assert_eq!(first, "https://example.com/a");
        assert_eq!(
            rx.try_recv().unwrap(),
            BackgroundTask::increment_durable("c1c1", 1)
        );
        assert_eq!(
            cache.get_url("c1c1").await.unwrap(),
            Some("https://example.com/a".to_string())
        );

        let second = service.resolve("c1c1").await.unwrap();
        assert_eq!(second, "https://example.com/a");
        assert_eq!(
            rx.try_recv().unwrap(),
            BackgroundTask::increment_volatile("c1c1")
        );
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let mut links = MockLinkRepository::new();
        links.expect_find_by_code().returning(|_| Ok(None));

        let (service, mut rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            MockCodeGenerator::new(),
            8,
        );

        let result = service.resolve("doesnotexist").await;

        assert!(matches!(result, Err(AppError::NotFound { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cache_error_is_not_a_miss() {
        let mut cache = MockCacheService::new();
        cache
            .expect_get_url()
            .returning(|_| Err(CacheError::ConnectionError("refused".to_string())));

        let mut links = MockLinkRepository::new();
        links.expect_find_by_code().times(0);

        let (service, _rx) = service(links, Arc::new(cache), MockCodeGenerator::new(), 8);

        let err = service.resolve("c1c1").await.unwrap_err();

        assert!(err.is_cache_failure());
    }

    #[tokio::test]
    async fn test_store_error_fails_resolve() {
        let mut links = MockLinkRepository::new();
        links
            .expect_find_by_code()
            .returning(|_| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let (service, _rx) = service(
            links,
            Arc::new(InMemoryCache::new(60)),
            MockCodeGenerator::new(),
            8,
        );

        let err = service.resolve("c1c1").await.unwrap_err();

        assert!(matches!(
            err,
            AppError::ResolveFailed {
                stage: ResolveStage::Store,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resolve_from_store_absorbs_cache_write_failure() {
        let mut cache = MockCacheService::new();
        cache.expect_get_url().times(0);
        cache
            .expect_set_url()
            .times(1)
            .returning(|_, _, _| Err(CacheError::ConnectionError("refused".to_string())));

        let mut links = MockLinkRepository::new();
        links
            .expect_find_by_code()
            .returning(|code| Ok(Some(existing(code, "https://example.com/b"))));

        let (service, mut rx) = service(links, Arc::new(cache), MockCodeGenerator::new(), 8);

        let target = service.resolve_from_store("c2c2").await.unwrap();

        assert_eq!(target, "https://example.com/b");
        assert_eq!(
            rx.try_recv().unwrap(),
            BackgroundTask::increment_durable("c2c2", 1)
        );
    }

    #[tokio::test]
    async fn test_hit_returns_target_when_task_queue_closed() {
        let cache = Arc::new(InMemoryCache::new(60));
        cache
            .set_url("c3c3", "https://example.com/c", None)
            .await
            .unwrap();

        let (service, rx) = service(
            MockLinkRepository::new(),
            cache,
            MockCodeGenerator::new(),
            8,
        );
        drop(rx);

        assert_eq!(
            service.resolve("c3c3").await.unwrap(),
            "https://example.com/c"
        );
    }

    #[test]
    fn test_short_url_trims_trailing_slash() {
        let (service, _rx) = service(
            MockLinkRepository::new(),
            Arc::new(InMemoryCache::new(60)),
            MockCodeGenerator::new(),
            1,
        );

        assert_eq!(
            service.short_url("https://s.example.com/", "abcd"),
            "https://s.example.com/abcd"
        );
    }

    fn spawn_worker(cache: Arc<InMemoryCache>, rx: mpsc::Receiver<BackgroundTask>) -> tokio::task::JoinHandle<()> {
        let executor = Arc::new(TaskExecutor::new(
            cache,
            Arc::new(MockLinkRepository::new()),
            Duration::from_secs(1),
            0,
        ));
        tokio::spawn(run_task_worker(rx, executor, 8))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_count_exactly() {
        let cache = Arc::new(InMemoryCache::new(60));
        cache
            .set_url("hot1", "https://example.com/hot", None)
            .await
            .unwrap();

        let (service, rx) = service(
            MockLinkRepository::new(),
            cache.clone(),
            MockCodeGenerator::new(),
            HITS as usize,
        );
        let service = Arc::new(service);
        let worker = spawn_worker(cache.clone(), rx);

        let mut hits = JoinSet::new();
        for _ in 0..HITS {
            let service = service.clone();
            hits.spawn(async move { service.resolve("hot1").await });
        }
        while let Some(result) = hits.join_next().await {
            assert_eq!(result.unwrap().unwrap(), "https://example.com/hot");
        }

        drop(service);
        worker.await.unwrap();

        assert_eq!(cache.peek_clicks("hot1"), Some(HITS));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hits_interleaved_with_flushes_lose_nothing() {
        let cache = Arc::new(InMemoryCache::new(60));
        cache
            .set_url("hot1", "https://example.com/hot", None)
            .await
            .unwrap();

        let durable = Arc::new(AtomicI64::new(0));
        let mut store = MockLinkRepository::new();
        {
            let durable = durable.clone();
            store
                .expect_increment_clicks()
                .returning(move |_, delta| {
                    durable.fetch_add(delta, Ordering::SeqCst);
                    Ok(true)
                });
        }
        let flusher = Arc::new(ClickFlusher::new(
            cache.clone(),
            Arc::new(store),
            FlusherSettings::default(),
        ));

        let (service, rx) = service(
            MockLinkRepository::new(),
            cache.clone(),
            MockCodeGenerator::new(),
            HITS as usize,
        );
        let service = Arc::new(service);
        let worker = spawn_worker(cache.clone(), rx);

        let mut hits = JoinSet::new();
        for _ in 0..HITS {
            let service = service.clone();
            hits.spawn(async move { service.resolve("hot1").await });
        }

        let flushes = {
            let flusher = flusher.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    flusher.flush_once().await;
                    tokio::task::yield_now().await;
                }
            })
        };

        while let Some(result) = hits.join_next().await {
            assert!(result.unwrap().is_ok());
        }
        flushes.await.unwrap();
        drop(service);
        worker.await.unwrap();

        let volatile = cache.peek_clicks("hot1").unwrap_or(0);
        assert_eq!(durable.load(Ordering::SeqCst) + volatile, HITS);
    }
}
