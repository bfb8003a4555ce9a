//! Rate meter: lifetime count, mean rate and 1/5/15-minute decayed rates.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::trace;

use crate::clock::Clock;
use crate::ewma::Ewma;
use crate::query::MeterMetric;

/// Below this age the mean rate is reported as 0.
const MIN_MEAN_PERIOD: Duration = Duration::from_millis(100);

/// Point-in-time view of a [`Meter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct MeterSummary {
    pub mean: f64,
    pub count: u64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
}

impl MeterSummary {
    pub fn get(&self, metric: MeterMetric) -> f64 {
        match metric {
            MeterMetric::Mean => self.mean,
            MeterMetric::Count => self.count as f64,
            MeterMetric::Rate1 => self.rate1,
            MeterMetric::Rate5 => self.rate5,
            MeterMetric::Rate15 => self.rate15,
        }
    }
}

#[derive(Debug)]
struct MeterState {
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
    count: u64,
    last_tick: Duration,
}

/// Measures the rate at which an event occurs.
///
/// Decay is advanced lazily: every mark and every rate read first replays
/// the ticks that elapsed since the previous one, one interval at a time.
#[derive(Debug)]
pub struct Meter {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    start: Duration,
    state: Mutex<MeterState>,
}

impl Meter {
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration) -> Self {
        let now = clock.now();
        Self {
            clock,
            tick_interval,
            start: now,
            state: Mutex::new(MeterState {
                m1: Ewma::one_minute(tick_interval),
                m5: Ewma::five_minutes(tick_interval),
                m15: Ewma::fifteen_minutes(tick_interval),
                count: 0,
                last_tick: now,
            }),
        }
    }

    /// Record one occurrence of the event.
    pub fn mark(&self) {
        let mut state = self.ticked();
        state.count += 1;
        state.m1.update(1);
        state.m5.update(1);
        state.m15.update(1);
    }

    /// Number of events marked since creation.
    pub fn count(&self) -> u64 {
        self.lock().count
    }

    /// Events per second averaged over the meter's whole lifetime.
    pub fn mean(&self) -> f64 {
        let count = self.lock().count;
        self.mean_of(count)
    }

    pub fn rate1(&self) -> f64 {
        self.ticked().m1.rate()
    }

    pub fn rate5(&self) -> f64 {
        self.ticked().m5.rate()
    }

    pub fn rate15(&self) -> f64 {
        self.ticked().m15.rate()
    }

    /// All values read under a single acquisition of the lock.
    pub fn summary(&self) -> MeterSummary {
        let state = self.ticked();
        MeterSummary {
            mean: self.mean_of(state.count),
            count: state.count,
            rate1: state.m1.rate(),
            rate5: state.m5.rate(),
            rate15: state.m15.rate(),
        }
    }

    fn mean_of(&self, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let period = self.clock.now().saturating_sub(self.start);
        if period <= MIN_MEAN_PERIOD {
            return 0.0;
        }
        count as f64 / period.as_secs_f64()
    }

    fn lock(&self) -> MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state and catch decay up to now.
    fn ticked(&self) -> MutexGuard<'_, MeterState> {
        let mut state = self.lock();
        let now = self.clock.now();
        let mut ticks = 0u64;
        while now.saturating_sub(state.last_tick) >= self.tick_interval {
            state.last_tick += self.tick_interval;
            state.m1.tick();
            state.m5.tick();
            state.m15.tick();
            ticks += 1;
        }
        if ticks > 0 {
            trace!(ticks, "meter decay caught up");
        }
        state
    }
}
