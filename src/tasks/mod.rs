//! Background Tasks Module
//!
//! # Tasks
//! - Cache cleanup: removes expired entries at the configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
