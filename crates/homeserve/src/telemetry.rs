//! Tracing setup for the booking service.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("log level '{value}' does not parse as a filter directive")]
    Filter { value: String, source: ParseError },
    #[error("failed to install the tracing subscriber: {0}")]
    Install(Box<dyn std::error::Error + Send + Sync>),
}

/// Installs the global subscriber. An explicit `RUST_LOG` wins; otherwise the
/// configured level applies to the booking crates while dependencies stay at
/// `warn`, so wizard and negotiation traces are not drowned out.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(booking_directives(&config.log_level)).map_err(|source| {
            TelemetryError::Filter {
                value: config.log_level.clone(),
                source,
            }
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}

fn booking_directives(level: &str) -> String {
    format!("warn,homeserve={level},homeserve_api={level}")
}
