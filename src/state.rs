//! Shared application state injected into every handler.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{mpsc, watch};

use crate::application::services::{LinkService, LinkServiceSettings};
use crate::domain::background_task::BackgroundTask;
use crate::domain::click_flusher::FlusherState;
use crate::infrastructure::cache::CacheService;
use crate::infrastructure::persistence::PgLinkRepository;
use crate::utils::code_generator::RandomCodeGenerator;

/// Handles shared by all requests. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub link_service: Arc<LinkService<PgLinkRepository>>,
    pub links: Arc<PgLinkRepository>,
    pub cache: Arc<dyn CacheService>,
    pub task_sender: mpsc::Sender<BackgroundTask>,
    pub flusher_state: watch::Receiver<FlusherState>,
    pub base_url: String,
}

impl AppState {
    /// Builds the state around an existing pool and cache.
    ///
    /// The link service gets a [`RandomCodeGenerator`] and shares the
    /// repository, cache and task queue held here.
    pub fn new(
        pool: PgPool,
        cache: Arc<dyn CacheService>,
        task_sender: mpsc::Sender<BackgroundTask>,
        flusher_state: watch::Receiver<FlusherState>,
        base_url: impl Into<String>,
        settings: LinkServiceSettings,
    ) -> Self {
        let links = Arc::new(PgLinkRepository::new(Arc::new(pool)));

        let link_service = Arc::new(LinkService::new(
            links.clone(),
            cache.clone(),
            Arc::new(RandomCodeGenerator),
            task_sender.clone(),
            settings,
        ));

        Self {
            link_service,
            links,
            cache,
            task_sender,
            flusher_state,
            base_url: base_url.into(),
        }
    }
}
