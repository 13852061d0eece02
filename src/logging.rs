//! Tracing setup shared by the binaries

use crate::config::MonitoringConfig;

/// Default filter directive for a log level
pub fn default_filter(config: &MonitoringConfig) -> String {
    format!("chinchiro={},warn", config.log_level.as_str())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(config: &MonitoringConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(config).into()),
        )
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_filter() {
        let config = MonitoringConfig {
            log_level: LogLevel::Debug,
            log_events: false,
        };
        assert_eq!(default_filter(&config), "chinchiro=debug,warn");
        init_tracing(&config);
        init_tracing(&config);
    }
}
