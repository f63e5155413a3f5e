//! Utility functions for code generation and input checks.
//!
//! - [`code_generator`] - Short code generation and custom code validation
//! - [`target_url`] - Long URL validation
//! - [`db_error`] - Classification of database errors

pub mod code_generator;
pub mod db_error;
pub mod target_url;
