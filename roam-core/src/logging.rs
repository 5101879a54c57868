//! Logging sinks and the tracing bootstrap.
//!
//! The engine reports non-fatal conditions (overwritten dependencies,
//! listener pressure, throwing listeners) through a pair of injectable
//! sinks instead of logging directly, so embedders can reroute them. The
//! defaults forward to `tracing`.

use std::fmt;
use std::sync::Arc;

/// One logging sink: receives a formatted message.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// The warn/error sink pair carried through every component.
#[derive(Clone)]
pub struct RouterLogger {
    warn: LogSink,
    error: LogSink,
}

impl RouterLogger {
    pub fn new(warn: LogSink, error: LogSink) -> Self {
        Self { warn, error }
    }

    /// Replace only the warn sink.
    pub fn with_warn(mut self, warn: LogSink) -> Self {
        self.warn = warn;
        self
    }

    /// Replace only the error sink.
    pub fn with_error(mut self, error: LogSink) -> Self {
        self.error = error;
        self
    }

    pub fn warn(&self, message: &str) {
        (self.warn)(message);
    }

    pub fn error(&self, message: &str) {
        (self.error)(message);
    }
}

impl Default for RouterLogger {
    fn default() -> Self {
        Self {
            warn: Arc::new(|message| tracing::warn!(target: "roam", "{message}")),
            error: Arc::new(|message| tracing::error!(target: "roam", "{message}")),
        }
    }
}

impl fmt::Debug for RouterLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterLogger").finish_non_exhaustive()
    }
}

/// Install a global `tracing` subscriber honoring `RUST_LOG`.
///
/// Convenience for binaries and examples; libraries embedding the router
/// should configure their own subscriber instead.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
