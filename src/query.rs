//! Query vocabulary shared by the registry and its boundary adapters.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MetricsError, Result};
use crate::gauge::GaugeSummary;
use crate::histogram::HistogramSummary;
use crate::meter::MeterSummary;
use crate::metrics::MetricNames;
use crate::snapshot::WeightedSnapshot;

macro_rules! metric_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = MetricsError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(MetricsError::unknown_metric(other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

metric_enum! {
    /// Metrics of a meter
    MeterMetric {
        Mean => "mean",
        Count => "count",
        Rate1 => "rate1",
        Rate5 => "rate5",
        Rate15 => "rate15",
    }
}

metric_enum! {
    /// Metrics of a gauge; `Count` is the current value
    GaugeMetric {
        Min => "min",
        Max => "max",
        Count => "count",
    }
}

metric_enum! {
    /// Metrics of a histogram
    HistogramMetric {
        Count => "count",
        Min => "min",
        Max => "max",
        Mean => "mean",
        Stddev => "stddev",
        Quantiles => "quantiles",
        Distribution => "distribution",
    }
}

/// Quantiles keyed by their percentile, rendered as in `"0.05"`.
pub type Quantiles = BTreeMap<String, f64>;

/// Parameters of a histogram query
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramQuery {
    pub percentiles: Vec<f64>,
    /// Number of distribution buckets.
    pub scale: usize,
}

impl Default for HistogramQuery {
    fn default() -> Self {
        Self {
            percentiles: MetricNames::DEFAULT_PERCENTILES.to_vec(),
            scale: MetricNames::DEFAULT_SCALE,
        }
    }
}

impl HistogramQuery {
    pub fn new(percentiles: Vec<f64>, scale: usize) -> Self {
        Self { percentiles, scale }
    }

    /// Build a query from raw `key=value` pairs, as found in a query string.
    ///
    /// `percentiles` may repeat; `scale` takes the first occurrence. Absent
    /// parameters come from `defaults`. Unknown keys are rejected together,
    /// sorted by name.
    pub fn from_pairs<I, K, V>(pairs: I, defaults: &HistogramQuery) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut percentiles = Vec::new();
        let mut scale = None;
        let mut unknown = BTreeSet::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                MetricNames::PARAM_PERCENTILES => {
                    let p = value.trim().parse::<f64>().map_err(|_| {
                        MetricsError::Validation(format!("Invalid percentile {}", value))
                    })?;
                    percentiles.push(p);
                }
                MetricNames::PARAM_SCALE => {
                    if scale.is_none() {
                        scale = Some(value.trim().parse::<usize>().map_err(|_| {
                            MetricsError::Validation(format!("Invalid scale {}", value))
                        })?);
                    }
                }
                other => {
                    unknown.insert(other.to_string());
                }
            }
        }

        if !unknown.is_empty() {
            let keys: Vec<String> = unknown.into_iter().collect();
            return Err(MetricsError::Validation(format!(
                "Invalid query parameters: {}",
                keys.join(", ")
            )));
        }
        if percentiles.is_empty() {
            percentiles = defaults.percentiles.clone();
        }
        let query = Self {
            percentiles,
            scale: scale.unwrap_or(defaults.scale),
        };
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 {
            return Err(MetricsError::Validation(
                "Invalid scale 0, at least one bucket is required".into(),
            ));
        }
        Ok(())
    }

    /// Quantiles of `snapshot` at the requested percentiles.
    pub fn quantiles(&self, snapshot: &WeightedSnapshot) -> Result<Quantiles> {
        self.percentiles
            .iter()
            .map(|&p| snapshot.get_value(p).map(|v| (p.to_string(), v)))
            .collect()
    }
}

/// Full report of one histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramReport {
    #[serde(flatten)]
    pub summary: HistogramSummary,
    pub quantiles: Quantiles,
    pub distribution: Vec<u64>,
}

/// Result of a meter query, narrowed by how much of the path was given
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetersView {
    All(BTreeMap<String, BTreeMap<String, MeterSummary>>),
    Event(BTreeMap<String, MeterSummary>),
    Summary(MeterSummary),
    Value(f64),
}

/// Result of a gauge query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GaugesView {
    All(BTreeMap<String, GaugeSummary>),
    Gauge(GaugeSummary),
    Value(f64),
}

/// Result of a histogram query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistogramsView {
    All(BTreeMap<String, HistogramReport>),
    Histogram(HistogramReport),
    Quantiles(Quantiles),
    Distribution(Vec<u64>),
    Value(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_round_trip() {
        for m in MeterMetric::ALL {
            assert_eq!(m.as_str().parse::<MeterMetric>().unwrap(), *m);
        }
        assert_eq!(HistogramMetric::ALL.len(), 7);
        assert_eq!(GaugeMetric::Count.to_string(), "count");
    }

    #[test]
    fn test_unknown_metric() {
        let err = "p99".parse::<HistogramMetric>().unwrap_err();
        assert!(matches!(err, MetricsError::Validation(_)));
        assert_eq!(err.to_string(), "Unknown metric p99");
        assert!("rate60".parse::<MeterMetric>().is_err());
        assert!("value".parse::<GaugeMetric>().is_err());
    }

    #[test]
    fn test_pairs_default() {
        let empty: Vec<(&str, &str)> = Vec::new();
        let q = HistogramQuery::from_pairs(empty, &HistogramQuery::default()).unwrap();
        assert_eq!(q, HistogramQuery::default());
    }

    #[test]
    fn test_pairs_parsed() {
        let q = HistogramQuery::from_pairs(
            [("percentiles", "0.5"), ("scale", "4"), ("percentiles", "0.99")],
            &HistogramQuery::default(),
        )
        .unwrap();
        assert_eq!(q.percentiles, vec![0.5, 0.99]);
        assert_eq!(q.scale, 4);
    }

    #[test]
    fn test_unknown_parameters_sorted() {
        let err = HistogramQuery::from_pairs(
            [("zeta", "1"), ("scale", "2"), ("alpha", "x"), ("zeta", "2")],
            &HistogramQuery::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid query parameters: alpha, zeta");
    }

    #[test]
    fn test_bad_values() {
        let defaults = HistogramQuery::default();
        assert!(HistogramQuery::from_pairs([("scale", "ten")], &defaults).is_err());
        assert!(HistogramQuery::from_pairs([("scale", "0")], &defaults).is_err());
        assert!(HistogramQuery::from_pairs([("percentiles", "half")], &defaults).is_err());
    }

    #[test]
    fn test_quantile_keys() {
        let q = HistogramQuery::default();
        let quantiles = q.quantiles(&WeightedSnapshot::default()).unwrap();
        let keys: Vec<&str> = quantiles.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["0.05", "0.25", "0.5", "0.75", "0.95"]);
        assert!(quantiles.values().all(|v| *v == 0.0));

        let bad = HistogramQuery::new(vec![1.5], 10);
        assert!(matches!(
            bad.quantiles(&WeightedSnapshot::default()),
            Err(MetricsError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_views_serialize_flat() {
        let view = MetersView::Value(2.0);
        assert_eq!(serde_json::to_string(&view).unwrap(), "2.0");

        let report = HistogramReport {
            summary: HistogramSummary::default(),
            quantiles: Quantiles::new(),
            distribution: vec![0],
        };
        let json = serde_json::to_value(HistogramsView::Histogram(report)).unwrap();
        assert_eq!(json["count"], 0);
        assert_eq!(json["distribution"][0], 0);
    }
}
