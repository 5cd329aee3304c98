//! The cross-database revision transition engine: window-driven scheduling,
//! the per-user migration state machine, and post-migration verification.

pub mod integrity;
pub mod migrator;
pub mod scheduler;
pub mod status_events;
