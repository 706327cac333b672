//! Logger Module
//!
//! Injectable diagnostic sink used by the cache and its sync daemon.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Diagnostic sink capability.
pub trait Logger: Send + Sync {
    /// Logs a plain message.
    fn log(&self, message: &str);

    /// Logs preformatted arguments, as produced by `format_args!`.
    fn log_fmt(&self, args: fmt::Arguments<'_>) {
        self.log(&args.to_string());
    }
}

/// Default logger: forwards to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "cachemachine", "{}", message);
    }

    fn log_fmt(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "cachemachine", "{}", args);
    }
}

/// Swappable logger slot shared between the facade and the daemon.
pub(crate) struct LoggerCell {
    inner: RwLock<Arc<dyn Logger>>,
}

impl LoggerCell {
    pub(crate) fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            inner: RwLock::new(logger),
        }
    }

    pub(crate) fn replace(&self, logger: Arc<dyn Logger>) {
        *self.inner.write() = logger;
    }

    pub(crate) fn current(&self) -> Arc<dyn Logger> {
        self.inner.read().clone()
    }
}

impl Default for LoggerCell {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}
