//! Tracing setup for the CLI.
//!
//! Progress lines ("bundle written", "waiting for response") go through
//! `tracing` to stderr. The final summary on stdout is printed by `main` and
//! is unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "repo_review=info,warn";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `repo_review=info,warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=repo_review=debug repo-review --bundle-only
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
