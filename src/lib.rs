//! CacheMachine - A two-tier byte cache
//!
//! A bounded memory tier backed by a persistent disk tier, kept loosely
//! consistent by a periodic background sync task.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheMachine, SyncStatus, TierState};
pub use config::Config;
pub use error::{CacheError, Result, StoreError};
pub use logger::{Logger, TracingLogger};
pub use tasks::SyncReport;
