//! Forward-decay reservoir sampling.
//!
//! Each update gets a weight `exp(alpha * t)`, `t` being the seconds since
//! the reservoir's logical start, and a random priority `weight / u` with
//! `u` uniform in `(0, 1]`. Once the reservoir is full, a new sample only
//! gets in by evicting the lowest priority, which favours recent values.
//! Weights grow without bound, so every rescale interval all weights and
//! priorities are multiplied by `exp(-alpha * interval)` and the start is
//! moved forward by one interval.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::snapshot::{WeightedSample, WeightedSnapshot};

/// Sampling priority; a positive float ordered through its bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Priority(u64);

impl Priority {
    fn new(value: f64) -> Self {
        debug_assert!(value >= 0.0);
        Priority(value.to_bits())
    }

    fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Weights below this are treated as zero.
fn is_negligible(weight: f64) -> bool {
    weight < f64::MIN_POSITIVE
}

#[derive(Debug)]
pub struct Reservoir {
    samples: BTreeMap<Priority, WeightedSample>,
    capacity: usize,
    alpha: f64,
    rescale_interval: Duration,
    /// Updates since creation or the last rescale.
    count: u64,
    start: Duration,
    last_rescale: Duration,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl Reservoir {
    pub fn new(
        capacity: usize,
        alpha: f64,
        rescale_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            samples: BTreeMap::new(),
            capacity: capacity.max(1),
            alpha,
            rescale_interval,
            count: 0,
            start: now,
            last_rescale: now,
            clock,
            rng: StdRng::from_entropy(),
        }
    }

    /// Draw priorities from a seeded generator, for reproducible sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn update(&mut self, value: f64) {
        self.rescale_if_necessary();

        let elapsed = self.clock.now().saturating_sub(self.start).as_secs_f64();
        let weight = (self.alpha * elapsed).exp();
        let sample = WeightedSample::new(value, weight);
        let uniform = 1.0 - self.rng.gen::<f64>();
        let priority = Priority::new(weight / uniform);
        self.count += 1;

        // An exact priority collision overwrites the existing sample.
        if self.samples.len() < self.capacity {
            self.samples.insert(priority, sample);
            return;
        }
        let Some(lowest) = self.samples.keys().next().copied() else {
            return;
        };
        if lowest < priority && self.samples.insert(priority, sample).is_none() {
            self.samples.remove(&lowest);
        }
    }

    pub fn snapshot(&mut self) -> WeightedSnapshot {
        self.rescale_if_necessary();
        WeightedSnapshot::new(self.samples.values().copied())
    }

    /// Number of live samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `min(capacity, updates since the last rescale)`.
    pub fn size(&self) -> usize {
        self.capacity.min(usize::try_from(self.count).unwrap_or(usize::MAX))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn rescale_if_necessary(&mut self) {
        let now = self.clock.now();
        while now.saturating_sub(self.last_rescale) >= self.rescale_interval {
            self.last_rescale += self.rescale_interval;
            self.rescale();
        }
    }

    fn rescale(&mut self) {
        let factor = (-self.alpha * self.rescale_interval.as_secs_f64()).exp();
        let before = self.samples.len();
        if is_negligible(factor) {
            self.samples.clear();
        } else {
            let old = std::mem::take(&mut self.samples);
            for (priority, sample) in old {
                let weight = sample.weight * factor;
                if is_negligible(weight) {
                    continue;
                }
                self.samples.insert(
                    Priority::new(priority.get() * factor),
                    WeightedSample::new(sample.value, weight),
                );
            }
        }
        self.count = self.samples.len() as u64;
        self.start += self.rescale_interval;

        if self.samples.len() < before {
            debug!(
                dropped = before - self.samples.len(),
                kept = self.samples.len(),
                "reservoir rescale dropped negligible samples"
            );
        } else {
            trace!(factor, kept = self.samples.len(), "reservoir rescaled");
        }
    }
}
