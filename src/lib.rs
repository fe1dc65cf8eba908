//! Portal Cache - layered caching and data access for a course-materials portal
//!
//! Fronts a remote document store with a three-tier layered cache, a flat
//! single-lifetime cache and a request deduplicator.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod portal;
pub mod remote;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{PortalError, Result};
pub use portal::{Portal, ReadMode};
pub use tasks::spawn_cleanup_task;
