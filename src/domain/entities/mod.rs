//! Core domain entities.
//!
//! - [`Link`] - A stored short link with its durable click counter
//! - [`NewLink`] - A validated link ready to be inserted

pub mod link;

pub use link::{DEFAULT_LINK_TTL, Link, MAX_LINK_TTL, NewLink, NewLinkError};
