//! Cache Module
//!
//! Memory tier, persistent tier, sync bookkeeping and the facade over them.

mod disk;
mod entry;
mod lru;
mod machine;
mod memory;
mod stats;
mod sync_table;


// Re-export public types
pub use disk::{DiskStore, PersistentStore, ValueReader, DEFAULT_MAX_ITEMS};
pub use entry::RamEntry;
pub use lru::LruTracker;
pub use machine::{CacheMachine, TierState, MIN_MEMORY_BUDGET, SHUTDOWN_GRACE};
pub use memory::{MemoryStore, RamStore};
pub use stats::{CacheStats, TierStats};
pub use sync_table::{SyncStatus, SyncTable};
