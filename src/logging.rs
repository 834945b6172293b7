//! Logging setup.
//!
//! Logs go to stdout in the compact single-line format, which journald
//! captures as-is when the display runs as a systemd service. `RUST_LOG`
//! takes precedence over the configured level.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Build the filter: `RUST_LOG` if set and valid, otherwise `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Calling this twice is harmless; the second call reports an error that the
/// caller may ignore.
pub fn init_logging(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(stdout_layer)
        .try_init()
}
