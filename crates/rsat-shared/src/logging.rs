//! # Logging
//!
//! Structured `tracing` setup shared by the server binary and tests.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
        });
    }
}
