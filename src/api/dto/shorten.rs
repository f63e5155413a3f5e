//! DTOs for link shortening endpoint.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

/// Compiled regex for custom alias validation.
static CUSTOM_ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Longest link lifetime a client may request (30 days).
pub const MAX_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Request to shorten a single URL.
#[derive(Debug, Deserialize, Validate)]
pub struct ShortenRequest {
    /// The target URL. Must contain a scheme separator (`://`).
    #[validate(length(min = 1, max = 2048, message = "URL must be 1-2048 characters"))]
    pub url: String,

    /// Optional custom short code.
    #[validate(length(min = 4, max = 32))]
    #[validate(regex(path = "*CUSTOM_ALIAS_REGEX", message = "Alias may only contain letters, digits, '-' and '_'"))]
    pub custom_alias: Option<String>,

    /// Optional link lifetime in seconds (default 24 hours).
    #[validate(range(min = 1, max = 2_592_000))]
    pub ttl_seconds: Option<i64>,
}

/// Created short link.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub short_url: String,
    pub short_key: String,
    pub expires_at: DateTime<Utc>,
}
