//! Disk Sync Task
//!
//! Background task that periodically copies not-yet-persisted entries from
//! the memory tier into the persistent tier.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{MemoryStore, PersistentStore, SyncTable, TierStats};
use crate::error::StoreError;
use crate::logger::LoggerCell;

/// Default delay between two sync passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Entries written to the persistent tier and flagged persisted
    pub persisted: u64,
    /// Entries whose persistent write failed; retried next pass
    pub failed: u64,
    /// Entries dropped from the sync table because memory lost the key
    pub dropped: u64,
}

/// Everything a sync pass touches besides the persistent store.
#[derive(Clone)]
pub(crate) struct SyncContext {
    pub memory: Arc<dyn MemoryStore>,
    pub sync_table: Arc<SyncTable>,
    pub logger: Arc<LoggerCell>,
    pub stats: Arc<TierStats>,
}

/// Runs one pass over the sync table.
///
/// Keys the memory tier no longer holds cannot be recovered from either
/// tier, so their entries are removed. So are keys the persistent store
/// can never accept. Other write failures are logged and the entry stays
/// unpersisted.
pub(crate) async fn run_sync_pass(ctx: &SyncContext, store: &dyn PersistentStore) -> SyncReport {
    let mut report = SyncReport::default();

    for key in ctx.sync_table.unpersisted_keys() {
        let Some(value) = ctx.memory.get(&key) else {
            if ctx.sync_table.remove_unpersisted(&key) {
                report.dropped += 1;
            }
            continue;
        };

        match store.put(&key, &value).await {
            Ok(()) => {
                if ctx.sync_table.mark_persisted(&key) {
                    report.persisted += 1;
                }
            }
            Err(StoreError::InvalidKey(reason)) => {
                warn!("Key {} cannot be persisted, no longer tracking it: {}", key, reason);
                if ctx.sync_table.remove_unpersisted(&key) {
                    report.dropped += 1;
                }
            }
            Err(e) => {
                warn!("Disk sync failed for key {}: {}", key, e);
                ctx.logger
                    .current()
                    .log_fmt(format_args!("[cachemachine] Error syncing to disk: {}", e));
                report.failed += 1;
            }
        }
    }

    if report.persisted > 0 {
        ctx.logger.current().log_fmt(format_args!(
            "[cachemachine] Synced {} items to disk",
            report.persisted
        ));
    } else {
        debug!("Disk sync: nothing to persist");
    }

    ctx.stats
        .record_sync_pass(report.persisted, report.failed, report.dropped);
    report
}

// == Sync Daemon ==
/// Handle to the running sync task.
///
/// Dropping the handle signals the task and aborts it, releasing the
/// stores it holds.
pub struct SyncDaemon {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SyncDaemon {
    /// Spawns the sync loop. The first pass runs one `interval` after start.
    pub(crate) fn spawn(
        ctx: SyncContext,
        store: Arc<dyn PersistentStore>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            info!("Starting disk sync task with interval of {:?}", interval);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        run_sync_pass(&ctx, store.as_ref()).await;
                    }
                }
            }

            info!("Disk sync task stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Signals the task to stop and waits up to `grace` for it to finish
    /// its current pass. Returns false if the task had to be aborted.
    pub async fn stop(mut self, grace: Duration) -> bool {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(_) => true,
            Err(_) => {
                self.handle.abort();
                false
            }
        }
    }
}

impl Drop for SyncDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}
