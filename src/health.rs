//! Liveness and readiness surface for boundary adapters.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A zero-argument check supplied by the application.
#[derive(Clone)]
pub struct Probe(Arc<dyn Fn() -> bool + Send + Sync>);

impl Probe {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Probe(Arc::new(check))
    }

    /// A probe that always answers `value`.
    pub fn constant(value: bool) -> Self {
        Probe::new(move || value)
    }

    pub fn check(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Probe(..)")
    }
}

impl From<bool> for Probe {
    fn from(value: bool) -> Self {
        Probe::constant(value)
    }
}

/// Health status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"OK"` when healthy, `"KO"` otherwise
    pub status: String,
    pub healthy: bool,
    pub ready: bool,
    pub version: String,
    pub uptime_secs: f64,
}

impl HealthStatus {
    pub fn new(healthy: bool, ready: bool, version: &str, uptime_secs: f64) -> Self {
        Self {
            status: if healthy { "OK" } else { "KO" }.to_string(),
            healthy,
            ready,
            version: version.to_string(),
            uptime_secs,
        }
    }
}
