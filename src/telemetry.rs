//! Logging setup for binaries embedding the operator core.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the level picked from `verbose`.
/// Returns false if a subscriber was already installed.
pub fn init_logging(verbose: bool, json: bool) -> bool {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Installs the global subscriber from the logging section of the config.
pub fn init_from_config(config: &LoggingConfig) -> bool {
    init_logging(config.verbose, config.json)
}
