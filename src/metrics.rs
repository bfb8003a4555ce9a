//! Well-known names and defaults shared by the registry and its adapters.

/// Standard metric names
pub struct MetricNames;

impl MetricNames {
    // Built-in process gauges
    pub const MEMORY: &'static str = "memory";
    pub const CPU: &'static str = "cpu";
    pub const NUM_THREADS: &'static str = "num_threads";

    // Histogram query parameters
    pub const PARAM_PERCENTILES: &'static str = "percentiles";
    pub const PARAM_SCALE: &'static str = "scale";

    pub const DEFAULT_PERCENTILES: [f64; 5] = [0.05, 0.25, 0.50, 0.75, 0.95];
    pub const DEFAULT_SCALE: usize = 10;
}
