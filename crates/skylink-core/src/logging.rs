//! Tracing initialization.

use tracing_subscriber::EnvFilter;

/// Initialize structured logging with the default `info` level.
///
/// The `RUST_LOG` environment variable overrides the level as usual.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_filter("info");
}

/// Initialize structured logging with an explicit default filter.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
