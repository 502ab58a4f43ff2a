//! Logging setup

use tracing_subscriber::{fmt, EnvFilter};

use crate::LoggingConfig;

/// Install the global `tracing` subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig {
            level: "not a =valid= filter[".into(),
            json: false,
        };
        init_logging(&config);
        assert!(!init_logging(&LoggingConfig::default()));
    }
}
