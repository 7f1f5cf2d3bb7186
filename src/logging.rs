// 📜 Logging
// The binary installs the subscriber; the library only emits events.

use tracing_subscriber::EnvFilter;

const FALLBACK_DIRECTIVE: &str = "info";

/// Install the global subscriber for the CLI.
///
/// A `RUST_LOG` directive takes precedence over the `LOG_LEVEL` setting
/// passed in here. An unparseable `LOG_LEVEL` falls back to `info`. Events go
/// to stderr, leaving stdout to the JSON results.
pub fn init(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
}
