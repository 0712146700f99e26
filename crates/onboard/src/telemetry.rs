//! Tracing setup for the onboarding engine.
//!
//! Logging policy: access denials and workflow rule violations are expected
//! outcomes and stay at `debug`/`warn`; phase transitions log at `info`;
//! storage and signing faults log at `error`. A `RUST_LOG` directive in the
//! environment overrides the configured level.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("log filter directive '{directive}' did not parse")]
    Filter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("could not install the tracing subscriber: {0}")]
    Init(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn env_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|source| TelemetryError::Filter {
        directive: directive.to_string(),
        source,
    })
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level when both are set.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => env_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .compact()
        .try_init()
        .map_err(TelemetryError::Init)
}
