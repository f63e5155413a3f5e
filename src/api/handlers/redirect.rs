//! Handler for short URL redirect.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::code_generator::{MAX_CUSTOM_CODE_LENGTH, MIN_CODE_LENGTH};

/// Redirects a short code to its target URL.
///
/// # Endpoint
///
/// `GET /{code}`
///
/// Responds with `302 Found` and the target in `Location`.
///
/// # Cache Strategy
///
/// - **Cache hit**: Immediate redirect, click counted in the cache
/// - **Cache miss**: Durable read, cache repopulated, click counted durably
/// - **Cache error**: Logged, then resolved from the durable store only
///
/// # Errors
///
/// - 404 Not Found if the short code doesn't exist
/// - 503 Service Unavailable if the durable store cannot be reached
pub async fn redirect_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if !(MIN_CODE_LENGTH..=MAX_CUSTOM_CODE_LENGTH).contains(&code.len()) {
        return Err(AppError::not_found(code));
    }

    let target_url = match state.link_service.resolve(&code).await {
        Ok(target_url) => target_url,
        Err(e) if e.is_cache_failure() => {
            warn!(code = %code, error = %e, "Cache unavailable, resolving from store");
            state.link_service.resolve_from_store(&code).await?
        }
        Err(e) => return Err(e),
    };

    Ok((StatusCode::FOUND, [(header::LOCATION, target_url)]))
}
