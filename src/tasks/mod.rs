//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cache cleanup: sweeps expired layered entries and stale memoized responses

mod cleanup;

pub use cleanup::spawn_cleanup_task;
