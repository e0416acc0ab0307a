//! Tracing subscriber setup.
//!
//! The core only emits structured events through `tracing`; embedders
//! own the sinks. This helper wires a sensible subscriber for binaries
//! and tests that want one.

use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::models::LoggingConfig;

/// Initialize a global tracing subscriber from the logging config.
///
/// `RUST_LOG` overrides the configured level. Returns quietly if a
/// subscriber is already installed (tests initialize repeatedly).
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let result = if config.format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init(&config);
        // Second call must not panic.
        init(&config);
    }
}
