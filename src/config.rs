use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};
use crate::metrics::MetricNames;

/// Output format of the log subscriber installed by [`crate::logging::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Application version reported to boundary adapters
    pub version: String,
    /// Free-form description of the application
    pub about: String,
    /// Interval at which meter rates are decayed, in seconds
    pub tick_interval_secs: f64,
    /// Interval at which histogram reservoirs are rescaled, in seconds
    pub rescale_interval_secs: f64,
    /// Maximum number of samples kept per histogram
    pub reservoir_size: usize,
    /// Forward-decay constant of the histogram reservoirs
    pub reservoir_alpha: f64,
    /// Register the built-in memory, cpu and num_threads gauges
    pub process_gauges: bool,
    /// Percentiles reported when a histogram query names none
    pub default_percentiles: Vec<f64>,
    /// Distribution resolution used when a histogram query names none
    pub default_scale: usize,
    /// Default log filter, overridden by RUST_LOG
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            about: String::new(),
            tick_interval_secs: 5.0,
            rescale_interval_secs: 3600.0,
            reservoir_size: 1024,
            reservoir_alpha: 0.015,
            process_gauges: true,
            default_percentiles: MetricNames::DEFAULT_PERCENTILES.to_vec(),
            default_scale: MetricNames::DEFAULT_SCALE,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl MetricsConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MetricsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tick_interval_secs.is_finite() && self.tick_interval_secs > 0.0) {
            return Err(MetricsError::Config(format!(
                "tick_interval_secs must be positive, got {}",
                self.tick_interval_secs
            )));
        }
        if !(self.rescale_interval_secs.is_finite() && self.rescale_interval_secs > 0.0) {
            return Err(MetricsError::Config(format!(
                "rescale_interval_secs must be positive, got {}",
                self.rescale_interval_secs
            )));
        }
        if self.reservoir_size == 0 {
            return Err(MetricsError::Config("reservoir_size must be at least 1".into()));
        }
        if !(self.reservoir_alpha.is_finite() && self.reservoir_alpha >= 0.0) {
            return Err(MetricsError::Config(format!(
                "reservoir_alpha must be a non-negative number, got {}",
                self.reservoir_alpha
            )));
        }
        if let Some(p) = self
            .default_percentiles
            .iter()
            .find(|p| !(0.0..=1.0).contains(*p))
        {
            return Err(MetricsError::Config(format!(
                "default percentile {} is not in [0..1]",
                p
            )));
        }
        if self.default_scale == 0 {
            return Err(MetricsError::Config("default_scale must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs)
    }

    pub fn rescale_interval(&self) -> Duration {
        Duration::from_secs_f64(self.rescale_interval_secs)
    }
}
