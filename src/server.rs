//! HTTP server initialization and runtime setup.
//!
//! Handles database connections, cache setup, background task spawning, and
//! the Axum server lifecycle including graceful shutdown.

use crate::config::Config;
use crate::domain::click_flusher::ClickFlusher;
use crate::domain::task_worker::{TaskExecutor, run_task_worker};
use crate::infrastructure::cache::{CacheService, InMemoryCache, NullCache, RedisCache};
use crate::infrastructure::persistence::PgLinkRepository;
use crate::routes::app_router;
use crate::state::AppState;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Upper bound on waiting for background tasks after the server stops.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens the PostgreSQL pool using the configured limits.
///
/// # Errors
///
/// Returns an error if no connection can be established.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to database");
    Ok(pool)
}

/// Selects the cache backend.
///
/// - Redis when configured and reachable
/// - [`NullCache`] when Redis is configured but unreachable, so a cache
///   outage at startup does not keep the service down
/// - [`InMemoryCache`] when no Redis is configured
pub async fn connect_cache(config: &Config) -> Arc<dyn CacheService> {
    match &config.redis_url {
        Some(redis_url) => match RedisCache::connect(redis_url, config.cache_ttl_seconds).await {
            Ok(redis) => {
                info!("Cache enabled (Redis)");
                Arc::new(redis)
            }
            Err(e) => {
                warn!("Failed to connect to Redis: {}. Using NullCache.", e);
                Arc::new(NullCache::new())
            }
        },
        None => {
            info!("Redis not configured, using in-process cache");
            Arc::new(InMemoryCache::new(config.cache_ttl_seconds))
        }
    }
}

/// Runs the HTTP server with the given configuration.
///
/// Initializes:
/// - PostgreSQL connection pool and migrations
/// - Cache backend
/// - Background task worker
/// - Click flusher
/// - Axum HTTP server
///
/// On Ctrl-C or SIGTERM the server stops accepting connections, the flusher
/// stops, queued tasks are drained and one last flush cycle runs.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection or migration fails
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let pool = connect_database(&config).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let cache = connect_cache(&config).await;
    let links = Arc::new(PgLinkRepository::new(Arc::new(pool.clone())));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (task_tx, task_rx) = mpsc::channel(config.task_queue_capacity);

    let executor = Arc::new(TaskExecutor::new(
        cache.clone(),
        links.clone(),
        config.store_timeout(),
        config.task_retry_attempts,
    ));
    let worker = tokio::spawn(run_task_worker(
        task_rx,
        executor,
        config.task_worker_concurrency,
    ));

    let flusher = Arc::new(ClickFlusher::new(
        cache.clone(),
        links,
        config.flusher_settings(),
    ));
    let flusher_task = {
        let flusher = flusher.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { flusher.run(shutdown_rx).await })
    };

    let state = AppState::new(
        pool,
        cache,
        task_tx,
        flusher.subscribe(),
        config.base_url.clone(),
        config.link_service_settings(),
    );

    let app = app_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");

    tokio::spawn(forward_shutdown_signal(shutdown_tx));

    let mut server_shutdown = shutdown_rx;
    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    })
    .await?;

    info!("HTTP server stopped, finishing background work");

    match timeout(SHUTDOWN_TIMEOUT, finish_background(flusher, flusher_task, worker)).await {
        Ok(()) => info!("Background work finished"),
        Err(_) => error!(
            "Background work did not finish within {}s",
            SHUTDOWN_TIMEOUT.as_secs()
        ),
    }

    Ok(())
}

async fn finish_background(
    flusher: Arc<ClickFlusher<PgLinkRepository>>,
    flusher_task: tokio::task::JoinHandle<()>,
    worker: tokio::task::JoinHandle<()>,
) {
    flusher.stop();
    if let Err(e) = flusher_task.await {
        error!(error = %e, "Click flusher task panicked");
    }

    // The router and every task sender are gone once serve returns.
    if let Err(e) = worker.await {
        error!(error = %e, "Task worker panicked");
    }

    let report = flusher.flush_once().await;
    info!(
        clicks_flushed = report.clicks_flushed,
        clicks_lost = report.clicks_lost,
        "Final flush finished"
    );
}

/// Waits for Ctrl-C or SIGTERM and flips the shutdown channel.
async fn forward_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to create SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    shutdown_tx.send_replace(true);
}
