#![allow(dead_code)]

use chrono::{Duration, Utc};
use linkcache::application::services::LinkServiceSettings;
use linkcache::domain::background_task::BackgroundTask;
use linkcache::domain::click_flusher::FlusherState;
use linkcache::infrastructure::cache::{CacheService, InMemoryCache};
use linkcache::state::AppState;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub const BASE_URL: &str = "https://s.example.com";

pub async fn create_test_link(pool: &PgPool, code: &str, url: &str) {
    sqlx::query(
        "INSERT INTO links (code, target_url, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(code)
    .bind(url)
    .bind(Utc::now() + Duration::hours(24))
    .execute(pool)
    .await
    .unwrap();
}

pub async fn click_count(pool: &PgPool, code: &str) -> i64 {
    sqlx::query_scalar("SELECT click_count FROM links WHERE code = $1")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub struct TestState {
    pub state: AppState,
    pub cache: Arc<InMemoryCache>,
    pub tasks: mpsc::Receiver<BackgroundTask>,
    pub flusher_state: watch::Sender<FlusherState>,
}

pub fn create_test_state(pool: PgPool) -> TestState {
    create_test_state_with_cache(pool, Arc::new(InMemoryCache::new(60)))
}

pub fn create_test_state_with_cache(pool: PgPool, cache: Arc<InMemoryCache>) -> TestState {
    let (tx, rx) = mpsc::channel(100);
    let (flusher_tx, flusher_rx) = watch::channel(FlusherState::Idle);

    let state = AppState::new(
        pool,
        cache.clone() as Arc<dyn CacheService>,
        tx,
        flusher_rx,
        BASE_URL,
        LinkServiceSettings::default(),
    );

    TestState {
        state,
        cache,
        tasks: rx,
        flusher_state: flusher_tx,
    }
}
