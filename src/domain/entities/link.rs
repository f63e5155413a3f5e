//! Link entity representing a shortened URL mapping.

use chrono::{DateTime, Duration, Utc};

use crate::utils::code_generator::MIN_CODE_LENGTH;
use crate::utils::target_url::{TargetUrlError, validate_target_url};

/// Lifetime applied when a link is created without an explicit TTL.
pub const DEFAULT_LINK_TTL: Duration = Duration::hours(24);

/// Upper bound on a requested link lifetime.
pub const MAX_LINK_TTL: Duration = Duration::days(30);

/// A shortened URL with its durable click counter.
///
/// `expires_at` is informational: expired links still resolve.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Link {
    pub code: String,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub click_count: i64,
}

impl Link {
    /// Creates a new Link instance.
    pub fn new(
        code: String,
        target_url: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        click_count: i64,
    ) -> Self {
        Self {
            code,
            target_url,
            created_at,
            expires_at,
            click_count,
        }
    }

    /// Returns true if the link has passed its expiry time.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Reasons a [`NewLink`] cannot be built.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NewLinkError {
    #[error("short code must be at least {} characters", MIN_CODE_LENGTH)]
    CodeTooShort,
    #[error(transparent)]
    TargetUrl(#[from] TargetUrlError),
    #[error("ttl exceeds the maximum of {} days", MAX_LINK_TTL.num_days())]
    TtlTooLong,
}

/// Input data for inserting a new link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub code: String,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewLink {
    /// Builds an insertable link stamped with the current time.
    ///
    /// A missing or non-positive `ttl` falls back to [`DEFAULT_LINK_TTL`].
    ///
    /// # Errors
    ///
    /// Returns [`NewLinkError`] when the code is shorter than
    /// [`MIN_CODE_LENGTH`], the target is not an absolute URL, or the TTL is
    /// longer than [`MAX_LINK_TTL`].
    pub fn new(code: String, target_url: String, ttl: Option<Duration>) -> Result<Self, NewLinkError> {
        if code.chars().count() < MIN_CODE_LENGTH {
            return Err(NewLinkError::CodeTooShort);
        }
        validate_target_url(&target_url)?;

        let ttl = match ttl {
            Some(ttl) if ttl > MAX_LINK_TTL => return Err(NewLinkError::TtlTooLong),
            Some(ttl) if ttl > Duration::zero() => ttl,
            _ => DEFAULT_LINK_TTL,
        };

        let created_at = Utc::now();
        Ok(Self {
            code,
            target_url,
            created_at,
            expires_at: created_at + ttl,
        })
    }

    /// Returns a copy of this link with a different code and the same timestamps.
    pub fn with_code(&self, code: String) -> Self {
        Self {
            code,
            ..self.clone()
        }
    }
}
