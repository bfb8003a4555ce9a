//! JSON rendering of the full registry for boundary adapters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::gauge::GaugeSummary;
use crate::meter::MeterSummary;
use crate::query::{GaugesView, HistogramQuery, HistogramReport, HistogramsView, MetersView};
use crate::LiveMetrics;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    JsonPretty,
}

/// Everything the registry knows, at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub version: String,
    pub about: String,
    pub generated_at: DateTime<Utc>,
    pub healthy: bool,
    pub ready: bool,
    pub meters: BTreeMap<String, BTreeMap<String, MeterSummary>>,
    pub gauges: BTreeMap<String, GaugeSummary>,
    pub histograms: BTreeMap<String, HistogramReport>,
}

impl MetricsReport {
    pub fn collect(metrics: &LiveMetrics, query: &HistogramQuery) -> Result<Self> {
        let meters = match metrics.get_meters(None, None, None)? {
            MetersView::All(all) => all,
            _ => BTreeMap::new(),
        };
        let gauges = match metrics.get_gauges(None, None)? {
            GaugesView::All(all) => all,
            _ => BTreeMap::new(),
        };
        let histograms = match metrics.get_histograms(None, None, query)? {
            HistogramsView::All(all) => all,
            _ => BTreeMap::new(),
        };
        Ok(Self {
            version: metrics.version().to_string(),
            about: metrics.about().to_string(),
            generated_at: Utc::now(),
            healthy: metrics.is_healthy(),
            ready: metrics.is_ready(),
            meters,
            gauges,
            histograms,
        })
    }
}

/// Metrics exporter
pub struct Exporter {
    format: ExportFormat,
    query: HistogramQuery,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            query: HistogramQuery::default(),
        }
    }

    /// Use `query` for the quantiles and distributions of every histogram.
    pub fn with_query(mut self, query: HistogramQuery) -> Self {
        self.query = query;
        self
    }

    pub fn export(&self, metrics: &LiveMetrics) -> Result<String> {
        let report = MetricsReport::collect(metrics, &self.query)?;
        let rendered = match self.format {
            ExportFormat::Json => serde_json::to_string(&report)?,
            ExportFormat::JsonPretty => serde_json::to_string_pretty(&report)?,
        };
        Ok(rendered)
    }
}
