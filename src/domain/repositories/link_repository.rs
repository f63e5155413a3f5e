//! Repository trait for the durable short link store.

use crate::domain::entities::{Link, NewLink};
use async_trait::async_trait;

/// Errors raised by the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The code is already taken by another link.
    #[error("short code '{0}' already exists")]
    DuplicateCode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository interface for short links and their durable click counters.
///
/// Every method is a single atomic statement; callers never hold a lock on a
/// code across calls.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgLinkRepository`] - PostgreSQL implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Inserts a new link.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateCode`] if the code already exists. The
    /// existing row is left untouched.
    ///
    /// Returns [`StoreError::Database`] on any other database failure.
    async fn insert(&self, new_link: NewLink) -> Result<Link, StoreError>;

    /// Finds a link by its short code.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Link))` if found
    /// - `Ok(None)` if not found
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, StoreError>;

    /// Adds `delta` to the durable click counter in a single server-side update.
    ///
    /// Returns `Ok(true)` if a row was updated and `Ok(false)` if the code does
    /// not exist or `delta` is not positive.
    async fn increment_clicks(&self, code: &str, delta: i64) -> Result<bool, StoreError>;

    /// Round-trips a trivial query to verify connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}
