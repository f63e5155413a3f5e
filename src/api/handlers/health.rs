//! Handler for health check endpoint.

use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse};
use crate::domain::click_flusher::FlusherState;
use crate::domain::repositories::LinkRepository;
use crate::state::AppState;

/// Returns service health status with component checks.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response Codes
///
/// - **200 OK**: All components healthy
/// - **503 Service Unavailable**: One or more components degraded
///
/// # Components Checked
///
/// 1. **Database**: `SELECT 1`
/// 2. **Cache**: Backend health check (Redis PING)
/// 3. **Task Queue**: Channel open, remaining capacity
/// 4. **Flusher**: Current state, degraded once stopped
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let checks = HealthChecks {
        database: check_database(&state).await,
        cache: check_cache(&state).await,
        task_queue: check_task_queue(&state),
        flusher: check_flusher(&state),
    };

    let all_healthy = checks.database.is_ok()
        && checks.cache.is_ok()
        && checks.task_queue.is_ok()
        && checks.flusher.is_ok();

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_database(state: &AppState) -> CheckStatus {
    match state.links.ping().await {
        Ok(()) => CheckStatus::ok("Connected"),
        Err(e) => CheckStatus::error(format!("Database error: {}", e)),
    }
}

async fn check_cache(state: &AppState) -> CheckStatus {
    if state.cache.health_check().await {
        CheckStatus::ok("Cache reachable")
    } else {
        CheckStatus::error("Cache connection failed")
    }
}

fn check_task_queue(state: &AppState) -> CheckStatus {
    if state.task_sender.is_closed() {
        CheckStatus::error("Task queue is closed")
    } else {
        CheckStatus::ok(format!(
            "Free slots: {}/{}",
            state.task_sender.capacity(),
            state.task_sender.max_capacity()
        ))
    }
}

fn check_flusher(state: &AppState) -> CheckStatus {
    match *state.flusher_state.borrow() {
        FlusherState::Stopped => CheckStatus::error("Click flusher stopped"),
        current => CheckStatus::ok(format!("State: {}", current)),
    }
}
