//! Logging utilities for the bridge
//!
//! Structured `tracing` events for env lifetimes, global reference
//! promotion/release and deferred callback traffic. Emacs owns the
//! terminal, so the default writer is stderr and a file can be configured.

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn, Level};

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogSection;
use crate::host::FuncallExit;

/// Overrides the configured level with full filter directives
pub const LOG_ENV: &str = "EMACS_BRIDGE_LOG";

/// Event targets; all sit under the crate prefix so the default filter
/// directive covers them
pub const ENV_TARGET: &str = "emacs_bridge::env";
pub const GLOBAL_REF_TARGET: &str = "emacs_bridge::global_ref";
pub const CHANNEL_TARGET: &str = "emacs_bridge::channel";
pub const ENTRY_TARGET: &str = "emacs_bridge::entry";

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing for the process lifetime
static FILE_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Initialize logging from the `[logging]` config section (idempotent)
///
/// If the embedding process already installed a global subscriber, that
/// one is kept and this call only marks logging as initialized.
pub fn init(section: &LogSection) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(&section.level)));

        let writer = match section.file.as_deref() {
            Some(path) => {
                let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
                let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "emacs-bridge.log".into());
                let appender = tracing_appender::rolling::never(
                    directory.unwrap_or_else(|| std::path::Path::new(".")),
                    file_name,
                );
                let (writer, guard) = tracing_appender::non_blocking(appender);
                *FILE_GUARD.lock() = Some(guard);
                BoxMakeWriter::new(writer)
            }
            None => BoxMakeWriter::new(std::io::stderr),
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions));

        let installed = if section.json {
            tracing_subscriber::registry().with(filter).with(layer.json()).try_init()
        } else {
            tracing_subscriber::registry().with(filter).with(layer.compact()).try_init()
        };

        // Ignore error if the host process already has a subscriber
        installed.ok();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn parse_level(level: &str) -> Level {
    level.parse().unwrap_or(Level::INFO)
}

fn default_directive(level: &str) -> String {
    format!("emacs_bridge={}", parse_level(level))
}

/// Log an env becoming live
#[inline]
pub fn log_env_enter(depth: usize) {
    trace!(target: ENV_TARGET, depth, "env entered");
}

/// Log an env going out of scope
#[inline]
pub fn log_env_exit(depth: usize) {
    trace!(target: ENV_TARGET, depth, "env exited");
}

/// Log a value promoted to a global reference
#[inline]
pub fn log_promotion(outstanding: usize) {
    trace!(target: GLOBAL_REF_TARGET, outstanding, "value promoted");
}

/// Log a global reference release
#[inline]
pub fn log_release(deferred: bool) {
    trace!(target: GLOBAL_REF_TARGET, deferred, "global reference released");
}

/// Log a release queued because no env was live
#[inline]
pub fn log_release_queued(pending: usize) {
    debug!(target: GLOBAL_REF_TARGET, pending, "release deferred until next env");
}

/// Log a deferred release drain
#[inline]
pub fn log_release_drain(released: usize) {
    debug!(target: GLOBAL_REF_TARGET, released, "deferred releases drained");
}

/// Log a free the host refused
#[inline]
pub fn log_release_failed(exit: FuncallExit) {
    warn!(target: GLOBAL_REF_TARGET, exit = ?exit, "host refused to free a global reference; leaked");
}

/// Log a callback record entering the queue
#[inline]
pub fn log_callback_registered(arity: usize, pending: usize) {
    trace!(target: CHANNEL_TARGET, arity, pending, "callback registered");
}

/// Log a callback record that could not be queued
#[inline]
pub fn log_callback_dropped(reason: &str, capacity: usize) {
    warn!(target: CHANNEL_TARGET, reason, capacity, "callback record dropped");
}

/// Log a callback whose captured arguments had the wrong shape
#[inline]
pub fn log_callback_mismatch(expected: &str, arity: usize) {
    warn!(
        target: CHANNEL_TARGET,
        expected,
        arity,
        "callback arguments do not match wrapper shape; not invoked"
    );
}

/// Log a callback drain
#[inline]
pub fn log_callback_drain(delivered: usize, mismatched: usize, failed: usize) {
    debug!(target: CHANNEL_TARGET, delivered, mismatched, failed, "deferred callbacks drained");
}

/// Log a host exit turned into a native error
#[inline]
pub fn log_exit_translated(kind: &str, symbol: &str) {
    debug!(target: ENV_TARGET, kind, symbol, "host exit translated");
}

/// Log a native error raised back into the host
#[inline]
pub fn log_error_resignalled(error: &str) {
    debug!(target: ENTRY_TARGET, error, "native error signalled to host");
}

/// Log a panic caught at an entry point
#[inline]
pub fn log_panic(message: &str) {
    error!(target: ENTRY_TARGET, message, "panic caught at module entry point");
}
