//! Domain layer containing business entities and background processing.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Data access trait definitions
//! - [`background_task`] - Fire-and-forget side effects of create and resolve
//! - [`task_worker`] - Bounded-concurrency executor for background tasks
//! - [`click_flusher`] - Periodic transfer of volatile click counters
//!
//! # Click Counting Flow
//!
//! 1. A resolve queues [`background_task::BackgroundTask::IncrementVolatile`]
//!    on a cache hit or [`background_task::BackgroundTask::IncrementDurable`]
//!    on a miss
//! 2. [`task_worker::run_task_worker`] applies it to the cache or store
//! 3. [`click_flusher::ClickFlusher`] drains cache counters into
//!    [`repositories::LinkRepository::increment_clicks`]

pub mod background_task;
pub mod click_flusher;
pub mod entities;
pub mod repositories;
pub mod task_worker;
