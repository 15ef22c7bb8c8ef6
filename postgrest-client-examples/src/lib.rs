//! Shared setup for the demo binaries.

use tracing_subscriber::EnvFilter;

/// PostgREST instance used when none is given.
pub const DEFAULT_REST_URL: &str = "http://localhost:3000";

/// Base URL from the first CLI argument, then `POSTGREST_URL`, then
/// [`DEFAULT_REST_URL`].
pub fn rest_url() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("POSTGREST_URL").ok())
        .unwrap_or_else(|| DEFAULT_REST_URL.to_string())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
