//! # Telemetry
//!
//! Initializes the tracing subscriber for structured logging.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=marquee=trace` - Show trace for marquee crates only
//! - Default: the `[logging].filter` of the checkout config
//!
//! Audit events go to the `audit` target, so `RUST_LOG=audit=info` isolates
//! them.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSettings};
use crate::error::{CheckoutError, CheckoutResult};

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(settings: &LoggingSettings) -> CheckoutResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|e| CheckoutError::InvalidConfig(format!("Invalid log filter '{}': {}", settings.filter, e)))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match settings.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    installed.map_err(|e| CheckoutError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
