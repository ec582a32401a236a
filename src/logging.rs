//! Logging capability passed to pipeline components
//!
//! Components never reach for a global logger. They receive an
//! `Arc<dyn Telemetry>` through the pipeline session and report through it.
//! [`TracingTelemetry`] forwards to `tracing`; [`MemoryTelemetry`] keeps the
//! messages so tests can assert on what was reported.

use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Sink for operator-facing log messages
pub trait Telemetry: Send + Sync {
    /// Record a message at the given level
    fn log(&self, level: Level, message: &str);

    /// Shorthand for `log(Level::INFO, ..)`
    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    /// Shorthand for `log(Level::WARN, ..)`
    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    /// Shorthand for `log(Level::ERROR, ..)`
    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

/// Telemetry backed by the `tracing` macros
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    /// Shared handle
    pub fn shared() -> Arc<dyn Telemetry> {
        Arc::new(Self)
    }
}

impl Telemetry for TracingTelemetry {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            Level::TRACE => tracing::trace!("{}", message),
        }
    }
}

/// Telemetry that records every message in memory
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryTelemetry {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded messages
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Recorded messages at `level`
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Telemetry for MemoryTelemetry {
    fn log(&self, level: Level, message: &str) {
        tracing::debug!(target: "page_inspector::telemetry", "{}", message);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

/// Install the global `tracing` subscriber for the binary.
///
/// `verbosity` 0 = info, 1 = debug, 2+ = trace. `RUST_LOG` wins when set.
pub fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "page_inspector=info",
        1 => "page_inspector=debug",
        _ => "page_inspector=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
