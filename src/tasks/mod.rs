//! Background Tasks Module
//!
//! # Tasks
//! - Disk Sync: copies unpersisted memory-tier entries to the persistent tier

mod sync;

pub(crate) use sync::{run_sync_pass, SyncContext};
pub use sync::{SyncDaemon, SyncReport, DEFAULT_SYNC_INTERVAL};
