//! Tracing setup for the Intelligence Vault.
//!
//! - [`init_telemetry`] installs a human-readable `fmt` subscriber
//! - [`init_json_telemetry`] installs a JSON-lines subscriber for log shipping
//! - [`EventCapture`] records events in memory so tests can assert on logs
//!
//! Both initialisers honour `RUST_LOG` and fall back to the given default
//! directive (e.g. `"info"` or `"vault_rag=debug"`).

mod capture;

pub use capture::{CapturedEvent, EventCapture};

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a global pretty `fmt` subscriber writing to stderr.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
}

/// Install a global JSON subscriber writing one object per line to stderr.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_json_telemetry(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init_telemetry(DEFAULT_FILTER);
        assert!(init_json_telemetry(DEFAULT_FILTER).is_err());
    }
}
