//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize the JSON log subscriber.
///
/// Filtering is driven by `RUST_LOG`; without it, `info` and above for every
/// crate in the workspace.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}
