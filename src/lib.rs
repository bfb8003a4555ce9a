//! # livemetrics
//!
//! In-process live metrics for long-running services. Applications mark
//! events with a result, set gauges and record values in histograms; the
//! registry answers queries with decayed rates, gauge extremes and
//! forward-decay quantiles and distributions, in bounded memory.

pub mod clock;
pub mod config;
pub mod error;
pub mod ewma;
pub mod exporter;
pub mod gauge;
pub mod health;
pub mod histogram;
pub mod instrument;
pub mod logging;
pub mod meter;
pub mod metrics;
pub mod process;
pub mod query;
pub mod reservoir;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LogFormat, MetricsConfig};
pub use error::{MetricsError, Result};
pub use gauge::{Gauge, GaugeSummary, GaugeValue};
pub use health::{HealthStatus, Probe};
pub use histogram::{Histogram, HistogramSummary};
pub use instrument::{Instrumented, Label, Timer};
pub use meter::{Meter, MeterSummary};
pub use query::{
    GaugeMetric, GaugesView, HistogramMetric, HistogramQuery, HistogramReport, HistogramsView,
    MeterMetric, MetersView, Quantiles,
};
pub use reservoir::Reservoir;
pub use snapshot::{WeightedSample, WeightedSnapshot};

use crate::query::HistogramMetric as HM;

type MeterStore = HashMap<String, HashMap<String, Arc<Meter>>>;

/// Registry of every meter, gauge and histogram of an application.
///
/// Structures are created on first use and never removed, so a handle
/// obtained once stays valid for the registry's lifetime. Each structure
/// has its own lock; the maps are only write-locked to insert a new name.
pub struct LiveMetrics {
    config: MetricsConfig,
    clock: Arc<dyn Clock>,
    started: Duration,
    meters: RwLock<MeterStore>,
    gauges: RwLock<HashMap<String, Arc<Gauge>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    is_healthy: Probe,
    is_ready: Probe,
}

/// Builder for [`LiveMetrics`]
#[derive(Debug, Default)]
pub struct LiveMetricsBuilder {
    config: MetricsConfig,
    clock: Option<Arc<dyn Clock>>,
    is_healthy: Option<Probe>,
    is_ready: Option<Probe>,
}

impl LiveMetricsBuilder {
    pub fn config(mut self, config: MetricsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Liveness check; healthy by default.
    pub fn is_healthy<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.is_healthy = Some(Probe::new(check));
        self
    }

    /// Readiness check; defaults to the liveness check.
    pub fn is_ready<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.is_ready = Some(Probe::new(check));
        self
    }

    pub fn build(self) -> Result<LiveMetrics> {
        self.config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let is_healthy = self.is_healthy.unwrap_or_else(|| Probe::constant(true));
        let is_ready = self.is_ready.unwrap_or_else(|| is_healthy.clone());

        let metrics = LiveMetrics {
            started: clock.now(),
            clock,
            meters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            is_healthy,
            is_ready,
            config: self.config,
        };
        if metrics.config.process_gauges {
            process::register(&metrics);
        }
        info!(
            version = %metrics.config.version,
            tick_interval_secs = metrics.config.tick_interval_secs,
            reservoir_size = metrics.config.reservoir_size,
            process_gauges = metrics.config.process_gauges,
            "live metrics registry created"
        );
        Ok(metrics)
    }
}

impl LiveMetrics {
    pub fn builder() -> LiveMetricsBuilder {
        LiveMetricsBuilder::default()
    }

    /// Registry on the system clock, ready whenever healthy.
    pub fn new<F>(config: MetricsConfig, is_healthy: F) -> Result<Self>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::builder().config(config).is_healthy(is_healthy).build()
    }

    // Write primitives

    /// Mark one occurrence of `event` ending with `result`.
    pub fn mark(&self, event: &str, result: &str) {
        self.meter(event, result).mark();
    }

    /// Set gauge `name`; a computed value is re-evaluated on every read.
    pub fn gauge(&self, name: &str, value: impl Into<GaugeValue>) {
        self.gauge_handle(name).mark(value);
    }

    /// Record `value` in histogram `name`.
    pub fn histogram(&self, name: &str, value: f64) {
        self.histogram_handle(name).update(value);
    }

    // Handles

    pub fn meter(&self, event: &str, result: &str) -> Arc<Meter> {
        if let Some(meter) = read(&self.meters).get(event).and_then(|r| r.get(result)) {
            return meter.clone();
        }
        write(&self.meters)
            .entry(event.to_string())
            .or_default()
            .entry(result.to_string())
            .or_insert_with(|| {
                debug!(event, result, "meter created");
                Arc::new(self.new_meter())
            })
            .clone()
    }

    pub fn gauge_handle(&self, name: &str) -> Arc<Gauge> {
        get_or_create(&self.gauges, name, || {
            debug!(name, "gauge created");
            Gauge::default()
        })
    }

    pub fn histogram_handle(&self, name: &str) -> Arc<Histogram> {
        get_or_create(&self.histograms, name, || {
            debug!(name, "histogram created");
            self.new_histogram()
        })
    }

    // Instrumentation

    /// Wrap units of work of `event`: each run marks `ok` or `err` and
    /// records its duration in the `event` histogram.
    pub fn instrument<T, E>(
        &self,
        event: impl Into<String>,
        ok: Label<T>,
        err: Label<E>,
    ) -> Instrumented<'_, T, E> {
        Instrumented::new(self, event.into(), ok, err)
    }

    pub fn start_timer(&self, event: impl Into<String>) -> Timer<'_> {
        Timer::new(self, event.into())
    }

    // Queries

    /// Meter summaries, narrowed by `event`, then `result`, then `metric`.
    ///
    /// A narrower level requires every level above it. Naming an unknown
    /// meter creates it, so it reads as zero.
    pub fn get_meters(
        &self,
        event: Option<&str>,
        result: Option<&str>,
        metric: Option<MeterMetric>,
    ) -> Result<MetersView> {
        match (event, result, metric) {
            (None, None, None) => {
                let handles: Vec<(String, String, Arc<Meter>)> = read(&self.meters)
                    .iter()
                    .flat_map(|(event, results)| {
                        results
                            .iter()
                            .map(move |(result, m)| (event.clone(), result.clone(), m.clone()))
                    })
                    .collect();
                let mut all: BTreeMap<String, BTreeMap<String, MeterSummary>> = BTreeMap::new();
                for (event, result, meter) in handles {
                    all.entry(event).or_default().insert(result, meter.summary());
                }
                Ok(MetersView::All(all))
            }
            (None, _, _) => Err(MetricsError::Contract(
                "if metric/result is specified, event must also be specified".into(),
            )),
            (Some(_), None, Some(_)) => Err(MetricsError::Contract(
                "if metric is specified, result must also be specified".into(),
            )),
            (Some(event), None, None) => {
                let handles: Vec<(String, Arc<Meter>)> = read(&self.meters)
                    .get(event)
                    .map(|results| {
                        results
                            .iter()
                            .map(|(result, m)| (result.clone(), m.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(MetersView::Event(
                    handles
                        .into_iter()
                        .map(|(result, meter)| (result, meter.summary()))
                        .collect(),
                ))
            }
            (Some(event), Some(result), metric) => {
                let summary = self.meter(event, result).summary();
                Ok(match metric {
                    None => MetersView::Summary(summary),
                    Some(metric) => MetersView::Value(summary.get(metric)),
                })
            }
        }
    }

    /// Gauge summaries, narrowed by `name`, then `metric`. A `metric`
    /// alone is ignored.
    pub fn get_gauges(&self, name: Option<&str>, metric: Option<GaugeMetric>) -> Result<GaugesView> {
        match (name, metric) {
            // A metric without a name selects nothing narrower.
            (None, _) => {
                let handles: Vec<(String, Arc<Gauge>)> = read(&self.gauges)
                    .iter()
                    .map(|(name, g)| (name.clone(), g.clone()))
                    .collect();
                Ok(GaugesView::All(
                    handles
                        .into_iter()
                        .map(|(name, gauge)| (name, gauge.summary()))
                        .collect(),
                ))
            }
            (Some(name), metric) => {
                let summary = self.gauge_handle(name).summary();
                Ok(match metric {
                    None => GaugesView::Gauge(summary),
                    Some(metric) => GaugesView::Value(summary.get(metric)),
                })
            }
        }
    }

    /// Histogram reports, narrowed by `event`, then `metric`. A `metric`
    /// alone is ignored.
    ///
    /// `query` selects the reported percentiles and the distribution
    /// resolution; see [`LiveMetrics::histogram_query`] for the configured
    /// defaults.
    pub fn get_histograms(
        &self,
        event: Option<&str>,
        metric: Option<HistogramMetric>,
        query: &HistogramQuery,
    ) -> Result<HistogramsView> {
        query.validate()?;
        match (event, metric) {
            (None, _) => {
                let handles: Vec<(String, Arc<Histogram>)> = read(&self.histograms)
                    .iter()
                    .map(|(name, h)| (name.clone(), h.clone()))
                    .collect();
                let mut all = BTreeMap::new();
                for (name, histogram) in handles {
                    let (count, snapshot) = histogram.count_and_snapshot();
                    all.insert(name, report(count, &snapshot, query)?);
                }
                Ok(HistogramsView::All(all))
            }
            (Some(event), metric) => {
                let (count, snapshot) = self.histogram_handle(event).count_and_snapshot();
                let summary = HistogramSummary::from_snapshot(count, &snapshot);
                Ok(match metric {
                    None => HistogramsView::Histogram(report(count, &snapshot, query)?),
                    Some(HM::Quantiles) => HistogramsView::Quantiles(query.quantiles(&snapshot)?),
                    Some(HM::Distribution) => {
                        HistogramsView::Distribution(snapshot.get_distribution(query.scale))
                    }
                    Some(HM::Count) => HistogramsView::Value(summary.count as f64),
                    Some(HM::Min) => HistogramsView::Value(summary.min),
                    Some(HM::Max) => HistogramsView::Value(summary.max),
                    Some(HM::Mean) => HistogramsView::Value(summary.mean),
                    Some(HM::Stddev) => HistogramsView::Value(summary.stddev),
                })
            }
        }
    }

    /// Histogram query with the configured default percentiles and scale.
    pub fn histogram_query(&self) -> HistogramQuery {
        HistogramQuery::new(
            self.config.default_percentiles.clone(),
            self.config.default_scale,
        )
    }

    // Health and metadata

    pub fn is_healthy(&self) -> bool {
        self.is_healthy.check()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.check()
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn about(&self) -> &str {
        &self.config.about
    }

    pub fn uptime(&self) -> Duration {
        self.now().saturating_sub(self.started)
    }

    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.is_healthy(),
            self.is_ready(),
            self.version(),
            self.uptime().as_secs_f64(),
        )
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Duration {
        self.clock.now()
    }

    fn new_meter(&self) -> Meter {
        Meter::new(self.clock.clone(), self.config.tick_interval())
    }

    fn new_histogram(&self) -> Histogram {
        Histogram::new(Reservoir::new(
            self.config.reservoir_size,
            self.config.reservoir_alpha,
            self.config.rescale_interval(),
            self.clock.clone(),
        ))
    }
}

impl std::fmt::Debug for LiveMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMetrics")
            .field("version", &self.config.version)
            .field("meters", &read(&self.meters).values().map(HashMap::len).sum::<usize>())
            .field("gauges", &read(&self.gauges).len())
            .field("histograms", &read(&self.histograms).len())
            .finish()
    }
}

fn report(count: u64, snapshot: &WeightedSnapshot, query: &HistogramQuery) -> Result<HistogramReport> {
    Ok(HistogramReport {
        summary: HistogramSummary::from_snapshot(count, snapshot),
        quantiles: query.quantiles(snapshot)?,
        distribution: snapshot.get_distribution(query.scale),
    })
}

fn get_or_create<V>(
    store: &RwLock<HashMap<String, Arc<V>>>,
    name: &str,
    create: impl FnOnce() -> V,
) -> Arc<V> {
    if let Some(existing) = read(store).get(name) {
        return existing.clone();
    }
    write(store)
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(create()))
        .clone()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
