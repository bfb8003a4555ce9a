//! Histogram: a lifetime update count over a decaying reservoir.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::reservoir::Reservoir;
use crate::snapshot::WeightedSnapshot;

/// Flat statistics of a [`Histogram`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

impl HistogramSummary {
    pub fn from_snapshot(count: u64, snapshot: &WeightedSnapshot) -> Self {
        Self {
            count,
            min: snapshot.min(),
            max: snapshot.max(),
            mean: snapshot.mean(),
            stddev: snapshot.stddev(),
        }
    }
}

#[derive(Debug)]
struct HistogramState {
    count: u64,
    reservoir: Reservoir,
}

/// Distribution of a stream of values, recent values weighing more.
#[derive(Debug)]
pub struct Histogram {
    state: Mutex<HistogramState>,
}

impl Histogram {
    pub fn new(reservoir: Reservoir) -> Self {
        Self {
            state: Mutex::new(HistogramState {
                count: 0,
                reservoir,
            }),
        }
    }

    pub fn update(&self, value: f64) {
        let mut state = self.lock();
        state.count += 1;
        state.reservoir.update(value);
    }

    /// Number of values recorded since creation, evicted ones included.
    pub fn count(&self) -> u64 {
        self.lock().count
    }

    /// Number of samples currently held by the reservoir.
    pub fn live_samples(&self) -> usize {
        self.lock().reservoir.len()
    }

    /// Fresh snapshot, with the reservoir rescaled up to now.
    pub fn snapshot(&self) -> WeightedSnapshot {
        self.lock().reservoir.snapshot()
    }

    pub fn summary(&self) -> HistogramSummary {
        let (count, snapshot) = self.count_and_snapshot();
        HistogramSummary::from_snapshot(count, &snapshot)
    }

    /// Count and snapshot taken under one lock.
    pub fn count_and_snapshot(&self) -> (u64, WeightedSnapshot) {
        let mut state = self.lock();
        let snapshot = state.reservoir.snapshot();
        (state.count, snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, HistogramState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
