//! Gauge: the latest value of a measurement plus its extremes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::query::GaugeMetric;

/// What a gauge is marked with: a number, or a closure producing one.
#[derive(Clone)]
pub enum GaugeValue {
    Fixed(f64),
    /// Re-evaluated on every read of the gauge.
    Computed(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl GaugeValue {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        GaugeValue::Computed(Arc::new(f))
    }
}

impl fmt::Debug for GaugeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaugeValue::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            GaugeValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<f64> for GaugeValue {
    fn from(value: f64) -> Self {
        GaugeValue::Fixed(value)
    }
}

impl From<i64> for GaugeValue {
    fn from(value: i64) -> Self {
        GaugeValue::Fixed(value as f64)
    }
}

impl From<u64> for GaugeValue {
    fn from(value: u64) -> Self {
        GaugeValue::Fixed(value as f64)
    }
}

impl From<i32> for GaugeValue {
    fn from(value: i32) -> Self {
        GaugeValue::Fixed(f64::from(value))
    }
}

impl From<usize> for GaugeValue {
    fn from(value: usize) -> Self {
        GaugeValue::Fixed(value as f64)
    }
}

/// Point-in-time view of a [`Gauge`]; `count` is the current value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct GaugeSummary {
    pub min: f64,
    pub max: f64,
    pub count: f64,
}

impl GaugeSummary {
    pub fn get(&self, metric: GaugeMetric) -> f64 {
        match metric {
            GaugeMetric::Min => self.min,
            GaugeMetric::Max => self.max,
            GaugeMetric::Count => self.count,
        }
    }
}

#[derive(Default)]
struct GaugeState {
    resolver: Option<Arc<dyn Fn() -> f64 + Send + Sync>>,
    /// `None` until the first mark; min and max are set together with it.
    current: Option<(f64, f64, f64)>,
}

impl GaugeState {
    fn record(&mut self, value: f64) {
        self.current = Some(match self.current {
            Some((_, min, max)) => (value, min.min(value), max.max(value)),
            None => (value, value, value),
        });
    }
}

#[derive(Default)]
pub struct Gauge {
    state: Mutex<GaugeState>,
}

impl Gauge {
    /// A gauge established by an initial value.
    pub fn with_value(value: impl Into<GaugeValue>) -> Self {
        let gauge = Gauge::default();
        gauge.mark(value);
        gauge
    }

    /// Register a new value. A computed value replaces any previous
    /// resolver; a fixed value clears it.
    pub fn mark(&self, value: impl Into<GaugeValue>) {
        match value.into() {
            GaugeValue::Fixed(v) => {
                let mut state = self.lock();
                state.resolver = None;
                state.record(v);
            }
            GaugeValue::Computed(f) => {
                let v = f();
                let mut state = self.lock();
                state.resolver = Some(f);
                state.record(v);
            }
        }
    }

    /// Current value. For a computed gauge this re-invokes the closure and
    /// folds the result into min and max.
    pub fn value(&self) -> f64 {
        self.resolved().current.map_or(0.0, |(v, _, _)| v)
    }

    /// Alias of [`Gauge::value`].
    pub fn count(&self) -> f64 {
        self.value()
    }

    pub fn min(&self) -> f64 {
        self.lock().current.map_or(0.0, |(_, min, _)| min)
    }

    pub fn max(&self) -> f64 {
        self.lock().current.map_or(0.0, |(_, _, max)| max)
    }

    pub fn is_computed(&self) -> bool {
        self.lock().resolver.is_some()
    }

    pub fn summary(&self) -> GaugeSummary {
        let (count, min, max) = self.resolved().current.unwrap_or_default();
        GaugeSummary { min, max, count }
    }

    /// Lock the state after folding in a fresh computed value. The closure
    /// runs unlocked, so it may read this gauge.
    fn resolved(&self) -> MutexGuard<'_, GaugeState> {
        let resolver = self.lock().resolver.clone();
        let Some(resolver) = resolver else {
            return self.lock();
        };
        let value = resolver();
        let mut state = self.lock();
        state.record(value);
        state
    }

    fn lock(&self) -> MutexGuard<'_, GaugeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Gauge")
            .field("current", &state.current)
            .field("computed", &state.resolver.is_some())
            .finish()
    }
}
