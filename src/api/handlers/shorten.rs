//! Handler for link shortening endpoint.

use axum::{Json, extract::State, http::StatusCode};
use chrono::Duration;
use validator::Validate;

use crate::api::dto::shorten::{ShortenRequest, ShortenResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Creates a short link.
///
/// # Endpoint
///
/// `POST /v1/shorten`
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://example.com/a",
///   "custom_alias": "my-link",
///   "ttl_seconds": 3600
/// }
/// ```
///
/// # Response
///
/// `201 Created`
///
/// ```json
/// {
///   "short_url": "https://s.example.com/my-link",
///   "short_key": "my-link",
///   "expires_at": "2025-01-01T01:00:00Z"
/// }
/// ```
///
/// # Errors
///
/// - 400 Bad Request if validation fails
/// - 409 Conflict if the custom alias is taken
/// - 500 Internal Server Error if no unique code could be allocated
pub async fn shorten_handler(
    State(state): State<AppState>,
    Json(payload): Json<ShortenRequest>,
) -> Result<(StatusCode, Json<ShortenResponse>), AppError> {
    payload.validate()?;

    let link = state
        .link_service
        .create_with_ttl(
            payload.url.trim().to_string(),
            payload.custom_alias,
            payload.ttl_seconds.map(Duration::seconds),
        )
        .await?;

    let short_url = state.link_service.short_url(&state.base_url, &link.code);

    Ok((
        StatusCode::CREATED,
        Json(ShortenResponse {
            short_url,
            short_key: link.code,
            expires_at: link.expires_at,
        }),
    ))
}
