//! Target URL checks shared by the HTTP layer and entity construction.

/// Shortest target accepted, e.g. `a://b`.
const MIN_TARGET_LENGTH: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetUrlError {
    #[error("target URL is empty")]
    Empty,
    #[error("target URL is too short")]
    TooShort,
    #[error("target URL must contain a scheme separator (\"://\")")]
    MissingScheme,
    #[error("target URL must not contain whitespace")]
    Whitespace,
}

/// Validates a long URL before it is stored.
///
/// The input is expected to be trimmed already; surrounding whitespace is
/// treated as an error rather than silently removed.
///
/// # Errors
///
/// Returns [`TargetUrlError`] describing the first rule that failed.
pub fn validate_target_url(url: &str) -> Result<(), TargetUrlError> {
    if url.trim().is_empty() {
        return Err(TargetUrlError::Empty);
    }

    if url.chars().any(char::is_whitespace) {
        return Err(TargetUrlError::Whitespace);
    }

    if url.len() < MIN_TARGET_LENGTH {
        return Err(TargetUrlError::TooShort);
    }

    match url.find("://") {
        Some(0) | None => Err(TargetUrlError::MissingScheme),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_urls() {
        assert!(validate_target_url("https://example.com/a").is_ok());
        assert!(validate_target_url("http://x.com").is_ok());
    }

    #[test]
    fn test_accepts_other_schemes() {
        assert!(validate_target_url("ftp://files.example.com/pub").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_target_url(""), Err(TargetUrlError::Empty));
        assert_eq!(validate_target_url("   "), Err(TargetUrlError::Empty));
    }

    #[test]
    fn test_rejects_missing_scheme() {
        assert_eq!(
            validate_target_url("example.com/path"),
            Err(TargetUrlError::MissingScheme)
        );
        assert_eq!(
            validate_target_url("://example.com"),
            Err(TargetUrlError::MissingScheme)
        );
    }

    #[test]
    fn test_rejects_too_short() {
        assert_eq!(validate_target_url("a:/"), Err(TargetUrlError::TooShort));
    }

    #[test]
    fn test_rejects_untrimmed() {
        assert_eq!(
            validate_target_url(" https://example.com"),
            Err(TargetUrlError::Whitespace)
        );
    }
}
