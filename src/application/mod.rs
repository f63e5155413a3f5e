//! Application layer services implementing business logic.
//!
//! Services coordinate the durable store, the cache and the background task
//! queue. HTTP handlers and the admin CLI talk to these services, never to
//! the stores directly.
//!
//! # Available Services
//!
//! - [`services::link_service::LinkService`] - Short link creation and cache-aside resolution

pub mod services;
