//! Logging setup
//!
//! `RUST_LOG` always wins. Otherwise the crate logs at `info`, or at
//! `debug` (per-message tracing) when `DEBUG` is set.

use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{}={}", env!("CARGO_PKG_NAME"), level)
}

/// Initialize the global tracing subscriber
pub fn setup_logger(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose))),
        )
        .init();
}
