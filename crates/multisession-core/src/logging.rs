//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Build the log filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global `fmt` subscriber.
///
/// Returns `false` if a global subscriber was already installed, which is
/// common in tests and when the embedding application set up its own.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .try_init()
        .is_ok()
}
