//! Tracing initialization helpers

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to `info` for this crate and `warn` for
/// everything else. Safe to call more than once (later calls are ignored),
/// which keeps tests that each spin up a gateway from panicking.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,llmgate_rs=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Initialize tracing with JSON output for log aggregation pipelines.
pub fn init_tracing_json() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,llmgate_rs=info"));

    let _ = fmt().json().with_env_filter(filter).try_init();
}
