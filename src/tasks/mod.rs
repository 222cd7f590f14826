//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is in use.
//!
//! # Tasks
//! - Maintenance: trims the cache to its size limit and compacts the journal

mod maintenance;

pub use maintenance::spawn_maintenance_task;
