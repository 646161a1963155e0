//! Diagnostic logging for the CLI host.
//!
//! Library code only emits `tracing` events. The binary installs a compact
//! formatter on stderr so stdout stays reserved for JSON output.

use std::io;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "STRATUS_LOG";
/// Directives used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Raised when a global subscriber is already installed.
#[derive(Debug, Error)]
#[error("failed to install log subscriber: {0}")]
pub struct LoggingError(String);

/// Builds a filter from raw directives, falling back to [`DEFAULT_FILTER`].
#[must_use]
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the stderr subscriber. `verbose` forces debug output.
///
/// # Errors
///
/// Returns [`LoggingError`] when a subscriber is already installed.
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        filter_from(std::env::var(LOG_ENV).ok().as_deref())
    };
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|err| LoggingError(err.to_string()))
}
