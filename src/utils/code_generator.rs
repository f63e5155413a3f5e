//! Short code generation and validation utilities.
//!
//! Random codes are drawn from the OS entropy source. If that source is not
//! available generation fails outright; there is no deterministic fallback.

use crate::error::AppError;
use serde_json::json;

/// Shortest code accepted anywhere in the system.
pub const MIN_CODE_LENGTH: usize = 4;

/// Longest custom code accepted from clients.
pub const MAX_CUSTOM_CODE_LENGTH: usize = 32;

/// Alphabet used for generated codes.
const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Random bytes at or above this value are rejected to keep the draw unbiased.
const ACCEPT_BELOW: u8 = (BASE62_ALPHABET.len() * 4) as u8;

/// Reserved codes that cannot be used as short links.
///
/// These codes are reserved for system endpoints to prevent routing conflicts.
const RESERVED_CODES: &[&str] = &["health", "v1", "api", "admin", "static"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodeGenError {
    #[error("requested code length {0} is below the minimum of {min}", min = MIN_CODE_LENGTH)]
    InvalidLength(usize),
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),
}

/// Source of fresh short codes.
///
/// Callers handle collisions; implementations make no uniqueness promise.
#[cfg_attr(test, mockall::automock)]
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> Result<String, CodeGenError>;
}

/// Base62 generator backed by `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> Result<String, CodeGenError> {
        if length < MIN_CODE_LENGTH {
            return Err(CodeGenError::InvalidLength(length));
        }

        let mut code = String::with_capacity(length);
        let mut buffer = [0u8; 32];

        while code.len() < length {
            getrandom::fill(&mut buffer)
                .map_err(|e| CodeGenError::EntropyUnavailable(e.to_string()))?;

            for byte in buffer.iter().copied().filter(|b| *b < ACCEPT_BELOW) {
                code.push(BASE62_ALPHABET[usize::from(byte) % BASE62_ALPHABET.len()] as char);
                if code.len() == length {
                    break;
                }
            }
        }

        Ok(code)
    }
}

/// Validates a user-provided custom short code.
///
/// # Rules
///
/// - Length: 4-32 characters
/// - Allowed characters: ASCII letters, digits, hyphens, underscores
/// - Cannot be a reserved system code
///
/// # Errors
///
/// Returns [`AppError::Validation`] if any validation rule is violated.
pub fn validate_custom_code(code: &str) -> Result<(), AppError> {
    if code.len() < MIN_CODE_LENGTH || code.len() > MAX_CUSTOM_CODE_LENGTH {
        return Err(AppError::bad_request(
            format!(
                "Custom code must be {}-{} characters",
                MIN_CODE_LENGTH, MAX_CUSTOM_CODE_LENGTH
            ),
            json!({ "provided_length": code.len() }),
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::bad_request(
            "Custom code can only contain letters, digits, hyphens, and underscores",
            json!({ "code": code }),
        ));
    }

    if RESERVED_CODES.contains(&code) {
        return Err(AppError::bad_request(
            "This code is reserved",
            json!({ "code": code }),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_code_has_requested_length() {
        let code = RandomCodeGenerator.generate(7).unwrap();
        assert_eq!(code.len(), 7);

        let code = RandomCodeGenerator.generate(40).unwrap();
        assert_eq!(code.len(), 40);
    }

    #[test]
    fn test_generate_code_uses_base62() {
        let code = RandomCodeGenerator.generate(64).unwrap();
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_code_produces_unique_codes() {
        let codes: HashSet<String> = (0..1000)
            .map(|_| RandomCodeGenerator.generate(12).unwrap())
            .collect();

        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_generate_code_rejects_short_length() {
        assert_eq!(
            RandomCodeGenerator.generate(3),
            Err(CodeGenError::InvalidLength(3))
        );
    }

    #[test]
    fn test_validate_minimum_length() {
        assert!(validate_custom_code("abcd").is_ok());
    }

    #[test]
    fn test_validate_maximum_length() {
        assert!(validate_custom_code(&"a".repeat(MAX_CUSTOM_CODE_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_mixed_valid_chars() {
        assert!(validate_custom_code("My_Link-2024").is_ok());
    }

    #[test]
    fn test_validate_too_short() {
        let err = validate_custom_code("abc").unwrap_err();
        assert!(err.to_string().contains("4-32 characters"));
    }

    #[test]
    fn test_validate_too_long() {
        assert!(validate_custom_code(&"a".repeat(MAX_CUSTOM_CODE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_special_characters() {
        assert!(validate_custom_code("my code").is_err());
        assert!(validate_custom_code("my/code").is_err());
        assert!(validate_custom_code("code@123").is_err());
    }

    #[test]
    fn test_validate_all_reserved_codes() {
        for &reserved in RESERVED_CODES.iter().filter(|c| c.len() >= MIN_CODE_LENGTH) {
            assert!(
                validate_custom_code(reserved).is_err(),
                "Reserved code '{}' should be invalid",
                reserved
            );
        }
    }
}
