//! Best-effort gauges describing the running process.
//!
//! Values come from `/proc/self` and are only available on Linux. Any read
//! or parse failure yields 0.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::gauge::GaugeValue;
use crate::metrics::MetricNames;
use crate::LiveMetrics;

/// Two CPU samples closer than this reuse the previous result.
const MIN_CPU_SAMPLE_PERIOD: Duration = Duration::from_millis(300);

/// Register the `memory`, `cpu` and `num_threads` gauges. No-op off Linux.
pub fn register(metrics: &LiveMetrics) {
    if !cfg!(target_os = "linux") {
        return;
    }
    metrics.gauge(MetricNames::MEMORY, GaugeValue::computed(memory_bytes));
    let sampler = Arc::new(Mutex::new(CpuSampler::default()));
    metrics.gauge(
        MetricNames::CPU,
        GaugeValue::computed(move || {
            sampler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .sample()
        }),
    );
    metrics.gauge(MetricNames::NUM_THREADS, GaugeValue::computed(num_threads));
}

/// Resident set size in bytes.
pub fn memory_bytes() -> f64 {
    read_proc("/proc/self/statm")
        .and_then(|statm| parse_statm_resident(&statm))
        .zip(page_size())
        .map_or(0.0, |(pages, page)| (pages * page) as f64)
}

/// Number of threads of the process.
pub fn num_threads() -> f64 {
    read_proc("/proc/self/stat")
        .and_then(|stat| parse_stat(&stat))
        .map_or(0.0, |stat| stat.num_threads as f64)
}

/// CPU time consumed by the process, in seconds.
pub fn cpu_seconds() -> Option<f64> {
    let stat = parse_stat(&read_proc("/proc/self/stat")?)?;
    let ticks = clock_ticks()?;
    Some((stat.utime + stat.stime) as f64 / ticks as f64)
}

/// Turns successive CPU-time readings into a utilization percentage.
#[derive(Debug, Default)]
pub struct CpuSampler {
    last: Option<(Instant, f64)>,
    last_result: f64,
}

impl CpuSampler {
    pub fn sample(&mut self) -> f64 {
        match cpu_seconds() {
            Some(cpu) => self.observe(Instant::now(), cpu),
            None => 0.0,
        }
    }

    /// Percentage of one core used since the previous observation. The
    /// first observation only sets the baseline and reports 0.
    pub fn observe(&mut self, now: Instant, cpu_secs: f64) -> f64 {
        let Some((then, cpu_then)) = self.last else {
            self.last = Some((now, cpu_secs));
            self.last_result = 0.0;
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(then);
        if elapsed < MIN_CPU_SAMPLE_PERIOD {
            return self.last_result;
        }
        let ratio = (cpu_secs - cpu_then) / elapsed.as_secs_f64();
        self.last = Some((now, cpu_secs));
        self.last_result = (ratio * 100.0).trunc().max(0.0);
        self.last_result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    utime: u64,
    stime: u64,
    num_threads: u64,
}

fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Second field of `/proc/self/statm`: resident pages.
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

/// Fields of `/proc/self/stat`. The command name may contain spaces, so
/// fields are counted from the closing parenthesis.
fn parse_stat(stat: &str) -> Option<ProcStat> {
    let rest = &stat[stat.rfind(')')? + 1..];
    // `rest` starts at field 3 (state).
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };
    Some(ProcStat {
        utime: field(14)?,
        stime: field(15)?,
        num_threads: field(20)?,
    })
}

#[cfg(target_os = "linux")]
fn page_size() -> Option<u64> {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size).ok().filter(|s| *s > 0)
}

#[cfg(target_os = "linux")]
fn clock_ticks() -> Option<u64> {
    // SAFETY: sysconf has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    u64::try_from(ticks).ok().filter(|t| *t > 0)
}

#[cfg(not(target_os = "linux"))]
fn page_size() -> Option<u64> {
    None
}

#[cfg(not(target_os = "linux"))]
fn clock_ticks() -> Option<u64> {
    None
}
