//! Tracing setup for the server binary.
//!
//! The subscriber starts at `info` so configuration loading is logged, then
//! switches to `logging.level` once the configuration is known. `RUST_LOG`,
//! when set, wins over both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter directives for a configured level. Connection-level noise from
/// hyper is kept at `warn` unless debugging.
fn directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" => level,
        _ => format!("{level},hyper=warn"),
    }
}

fn rust_log_is_set() -> bool {
    std::env::var_os("RUST_LOG").is_some_and(|v| !v.is_empty())
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init_tracing() {
    let filter = if rust_log_is_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives("info")))
    } else {
        EnvFilter::new(directives("info"))
    };

    let (filter, handle) = reload::Layer::new(filter);
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .is_ok()
    {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Switches the subscriber to the configured level.
///
/// Returns `false` when `RUST_LOG` is set or no subscriber was installed by
/// [`init_tracing`].
pub fn apply_logging_level(level: &str) -> bool {
    if rust_log_is_set() {
        tracing::debug!(configured = %level, "RUST_LOG is set; keeping its filter");
        return false;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return false;
    };
    match handle.reload(EnvFilter::new(directives(level))) {
        Ok(()) => {
            tracing::info!(level = %level, "Log level applied");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, level = %level, "Cannot apply log level");
            false
        }
    }
}
