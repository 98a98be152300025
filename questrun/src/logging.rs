//! Development-time tracing.
//!
//! Diagnostics go to stderr via `RUST_LOG` and are never part of command
//! output. Product output (status, listings) is printed by the binary.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, which keeps forced pauses,
/// backup recovery and constraint violations visible.
///
/// # Example
/// ```bash
/// RUST_LOG=questrun=debug questrun start
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
