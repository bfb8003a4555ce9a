//! Instrumentation of units of work.
//!
//! An [`Instrumented`] wrapper marks `(event, label)` on the registry when a
//! unit of work completes and records its wall-clock duration, in seconds,
//! in the histogram of the same event. The outcome of the work is returned
//! untouched; a label that fails to compute only skips the mark.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::LiveMetrics;

type LabelFn<T> = Box<dyn Fn(&T) -> anyhow::Result<String> + Send + Sync>;

/// Result label used when a unit of work succeeds (`T` is the value) or
/// fails (`T` is the error).
pub enum Label<T: ?Sized> {
    /// Record the duration only.
    None,
    Fixed(String),
    Computed(LabelFn<T>),
}

impl<T: ?Sized> Label<T> {
    pub fn fixed(label: impl Into<String>) -> Self {
        Label::Fixed(label.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Label::Computed(Box::new(f))
    }

    fn resolve(&self, subject: &T) -> Option<String> {
        match self {
            Label::None => None,
            Label::Fixed(label) => Some(label.clone()),
            Label::Computed(f) => match f(subject) {
                Ok(label) => Some(label),
                Err(e) => {
                    debug!(error = %e, "result label could not be computed, mark skipped");
                    None
                }
            },
        }
    }
}

impl<T: ?Sized> From<&str> for Label<T> {
    fn from(label: &str) -> Self {
        Label::Fixed(label.to_string())
    }
}

impl<T: ?Sized> From<String> for Label<T> {
    fn from(label: String) -> Self {
        Label::Fixed(label)
    }
}

impl<T: ?Sized> fmt::Debug for Label<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::None => f.write_str("None"),
            Label::Fixed(label) => f.debug_tuple("Fixed").field(label).finish(),
            Label::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Reusable wrapper timing and labelling units of work for one event.
///
/// Built by [`LiveMetrics::instrument`].
pub struct Instrumented<'a, T, E> {
    metrics: &'a LiveMetrics,
    event: String,
    ok: Label<T>,
    err: Label<E>,
}

impl<'a, T, E> Instrumented<'a, T, E> {
    pub(crate) fn new(metrics: &'a LiveMetrics, event: String, ok: Label<T>, err: Label<E>) -> Self {
        Self {
            metrics,
            event,
            ok,
            err,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Run `work` on the calling thread.
    pub fn run<F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let start = self.metrics.now();
        let outcome = work();
        self.record(&outcome, start);
        outcome
    }

    /// Await `work`; the duration includes the time spent suspended.
    pub async fn run_async<Fut>(&self, work: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let start = self.metrics.now();
        let outcome = work.await;
        self.record(&outcome, start);
        outcome
    }

    fn record(&self, outcome: &Result<T, E>, start: Duration) {
        let label = match outcome {
            Ok(value) => self.ok.resolve(value),
            Err(error) => self.err.resolve(error),
        };
        if let Some(label) = label {
            self.metrics.mark(&self.event, &label);
        }
        let elapsed = self.metrics.now().saturating_sub(start);
        self.metrics.histogram(&self.event, elapsed.as_secs_f64());
    }
}

impl<T, E> fmt::Debug for Instrumented<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented")
            .field("event", &self.event)
            .field("ok", &self.ok)
            .field("err", &self.err)
            .finish()
    }
}

/// RAII timer for a scope; records its duration when finished or dropped.
///
/// Built by [`LiveMetrics::start_timer`]. Finishing with [`Timer::ok`] or
/// [`Timer::err`] also marks the given result; a timer dropped unfinished
/// records the duration only.
pub struct Timer<'a> {
    metrics: &'a LiveMetrics,
    event: String,
    start: Duration,
    finished: bool,
}

impl<'a> Timer<'a> {
    pub(crate) fn new(metrics: &'a LiveMetrics, event: String) -> Self {
        Self {
            start: metrics.now(),
            metrics,
            event,
            finished: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.metrics.now().saturating_sub(self.start)
    }

    /// Finish, marking `result` and recording the duration.
    pub fn finish_with(mut self, result: &str) {
        self.finish(Some(result));
    }

    /// Alias of [`Timer::finish_with`] for the success path.
    pub fn ok(self, result: &str) {
        self.finish_with(result);
    }

    /// Alias of [`Timer::finish_with`] for the failure path.
    pub fn err(self, result: &str) {
        self.finish_with(result);
    }

    fn finish(&mut self, result: Option<&str>) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(result) = result {
            self.metrics.mark(&self.event, result);
        }
        self.metrics
            .histogram(&self.event, self.elapsed().as_secs_f64());
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.finish(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MetricsConfig;
    use crate::query::{HistogramMetric, HistogramQuery, HistogramsView, MeterMetric, MetersView};
    use std::sync::Arc;

    fn metrics() -> (Arc<ManualClock>, LiveMetrics) {
        let clock = ManualClock::new();
        let config = MetricsConfig {
            process_gauges: false,
            ..MetricsConfig::default()
        };
        let metrics = LiveMetrics::builder()
            .config(config)
            .clock(clock.clone())
            .build()
            .unwrap();
        (clock, metrics)
    }

    fn meter_count(m: &LiveMetrics, event: &str, result: &str) -> f64 {
        match m
            .get_meters(Some(event), Some(result), Some(MeterMetric::Count))
            .unwrap()
        {
            MetersView::Value(v) => v,
            other => panic!("unexpected view {:?}", other),
        }
    }

    fn histogram_metric(m: &LiveMetrics, event: &str, metric: HistogramMetric) -> f64 {
        match m
            .get_histograms(Some(event), Some(metric), &HistogramQuery::default())
            .unwrap()
        {
            HistogramsView::Value(v) => v,
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[test]
    fn test_success_and_failure_are_labelled() {
        let (clock, m) = metrics();
        let timed = m.instrument::<u32, String>("decorated", "OK".into(), "EXC".into());

        for value in [1, 2] {
            let out = timed.run(|| {
                clock.advance(Duration::from_millis(100));
                Ok(value)
            });
            assert_eq!(out, Ok(value));
        }
        let out = timed.run(|| Err("Exception".to_string()));
        assert_eq!(out, Err("Exception".to_string()));

        assert_eq!(meter_count(&m, "decorated", "OK"), 2.0);
        assert_eq!(meter_count(&m, "decorated", "EXC"), 1.0);
        assert_eq!(histogram_metric(&m, "decorated", HistogramMetric::Count), 3.0);
        assert!((histogram_metric(&m, "decorated", HistogramMetric::Max) - 0.1).abs() < 1e-9);
        assert_eq!(histogram_metric(&m, "decorated", HistogramMetric::Min), 0.0);
    }

    #[test]
    fn test_computed_labels() {
        let (_, m) = metrics();
        let timed = m.instrument::<u16, std::io::Error>(
            "http",
            Label::computed(|status: &u16| Ok(format!("{}xx", status / 100))),
            Label::computed(|e: &std::io::Error| Ok(format!("{:?}", e.kind()))),
        );
        timed.run(|| Ok(204)).unwrap();
        timed.run(|| Ok(503)).unwrap();
        timed
            .run(|| Err(std::io::Error::from(std::io::ErrorKind::TimedOut)))
            .unwrap_err();

        assert_eq!(meter_count(&m, "http", "2xx"), 1.0);
        assert_eq!(meter_count(&m, "http", "5xx"), 1.0);
        assert_eq!(meter_count(&m, "http", "TimedOut"), 1.0);
    }

    #[test]
    fn test_label_failure_never_masks_outcome() {
        let (_, m) = metrics();
        let timed = m.instrument::<i32, String>(
            "fragile",
            Label::computed(|_: &i32| anyhow::bail!("no label for you")),
            Label::computed(|_: &String| Err(anyhow::anyhow!("nor for you"))),
        );
        assert_eq!(timed.run(|| Ok(5)), Ok(5));
        assert_eq!(timed.run(|| Err("boom".to_string())), Err("boom".to_string()));

        match m.get_meters(Some("fragile"), None, None).unwrap() {
            MetersView::Event(results) => assert!(results.is_empty()),
            other => panic!("unexpected view {:?}", other),
        }
        assert_eq!(histogram_metric(&m, "fragile", HistogramMetric::Count), 2.0);
    }

    #[test]
    fn test_none_label_records_duration_only() {
        let (_, m) = metrics();
        let timed = m.instrument::<(), ()>("quiet", Label::None, Label::None);
        timed.run(|| Ok(())).unwrap();
        assert!(matches!(
            m.get_meters(Some("quiet"), None, None).unwrap(),
            MetersView::Event(ref r) if r.is_empty()
        ));
        assert_eq!(histogram_metric(&m, "quiet", HistogramMetric::Count), 1.0);
    }

    #[tokio::test]
    async fn test_async_duration_includes_suspension() {
        let (clock, m) = metrics();
        let timed = m.instrument::<&str, String>("async", "OK".into(), "EXC".into());
        let out = timed
            .run_async(async {
                tokio::task::yield_now().await;
                clock.advance(Duration::from_millis(250));
                tokio::task::yield_now().await;
                Ok("done")
            })
            .await;
        assert_eq!(out, Ok("done"));

        let failed = timed.run_async(async { Err("nope".to_string()) }).await;
        assert_eq!(failed, Err("nope".to_string()));

        assert_eq!(meter_count(&m, "async", "OK"), 1.0);
        assert_eq!(meter_count(&m, "async", "EXC"), 1.0);
        assert!((histogram_metric(&m, "async", HistogramMetric::Max) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_async_on_blocking_executor() {
        let (_, m) = metrics();
        let timed = m.instrument::<u8, ()>("blocking", "OK".into(), Label::None);
        let out = tokio_test::block_on(timed.run_async(async { Ok(7) }));
        assert_eq!(out, Ok(7));
        assert_eq!(meter_count(&m, "blocking", "OK"), 1.0);
    }

    #[test]
    fn test_timer_guard() {
        let (clock, m) = metrics();
        let timer = m.start_timer("scope");
        clock.advance(Duration::from_secs(2));
        assert_eq!(timer.elapsed(), Duration::from_secs(2));
        timer.ok("OK");

        m.start_timer("scope").err("ERR");
        m.start_timer("scope").finish_with("OK");
        {
            let _timer = m.start_timer("scope");
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(meter_count(&m, "scope", "OK"), 2.0);
        assert_eq!(meter_count(&m, "scope", "ERR"), 1.0);
        assert_eq!(histogram_metric(&m, "scope", HistogramMetric::Count), 4.0);
        assert_eq!(histogram_metric(&m, "scope", HistogramMetric::Max), 2.0);
    }
}
