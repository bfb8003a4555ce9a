//! Log subscriber installation.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, MetricsConfig};

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over
/// `config.log_level`. Returns `false` if a subscriber was already set.
pub fn init(config: &MetricsConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let config = MetricsConfig {
            log_level: "debug".into(),
            ..MetricsConfig::default()
        };
        init(&config);
        assert!(!init(&config));
        tracing::debug!("still logging after a second init");
    }
}
