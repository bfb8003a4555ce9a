//! Exponentially-weighted moving average of an event rate.
//!
//! Events are accumulated with [`Ewma::update`] and folded into the decayed
//! rate once per tick interval by [`Ewma::tick`]. Locking is left to the
//! owning [`crate::meter::Meter`].

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    interval_secs: f64,
    /// Events per second.
    rate: f64,
    uncounted: u64,
    initialized: bool,
}

impl Ewma {
    /// Average over a window of `minutes`, ticked every `tick_interval`.
    pub fn new(minutes: f64, tick_interval: Duration) -> Self {
        let interval_secs = tick_interval.as_secs_f64();
        Self {
            alpha: 1.0 - (-interval_secs / 60.0 / minutes).exp(),
            interval_secs,
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    pub fn one_minute(tick_interval: Duration) -> Self {
        Self::new(1.0, tick_interval)
    }

    pub fn five_minutes(tick_interval: Duration) -> Self {
        Self::new(5.0, tick_interval)
    }

    pub fn fifteen_minutes(tick_interval: Duration) -> Self {
        Self::new(15.0, tick_interval)
    }

    /// Record `n` events since the last tick.
    pub fn update(&mut self, n: u64) {
        self.uncounted = self.uncounted.saturating_add(n);
    }

    /// Fold the events seen since the previous tick into the rate.
    pub fn tick(&mut self) {
        let count = std::mem::take(&mut self.uncounted);
        let instant_rate = count as f64 / self.interval_secs;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Decayed rate in events per second; 0 until the first tick.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
