//! Tracing setup shared by the CLI and the server.
//!
//! Diagnostics go to stderr and are filtered by `RUST_LOG`. Generation
//! progress events are product output and are printed separately.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "forge=info";

/// Initialize the tracing subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=forge=debug forge generate --project ./site
/// ```
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

/// Like [`init`], with a caller-chosen fallback filter.
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
