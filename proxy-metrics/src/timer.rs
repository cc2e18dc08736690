use std::time::Duration;

use quanta::Clock;

use crate::{
    histogram::{Histogram, HistogramSnapshot},
    meter::Meter,
};

/// A histogram of durations combined with a meter of how often they are recorded.
///
/// Durations are recorded in nanoseconds.
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    /// Creates a new `Timer` with a reservoir of `reservoir_size` samples.
    pub fn new(reservoir_size: usize, clock: Clock) -> Self {
        Self { histogram: Histogram::new(reservoir_size), meter: Meter::new(clock) }
    }

    /// Records a duration.
    pub fn update(&self, elapsed: Duration) {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    /// Gets the number of durations recorded since creation.
    pub fn count(&self) -> u64 {
        self.histogram.count()
    }

    /// Takes a point-in-time snapshot of the timer.
    pub fn snapshot(&self) -> TimerSnapshot {
        let (rate1, rate5, rate15, rate_mean) = self.meter.rates();
        TimerSnapshot { histogram: self.histogram.snapshot(), rate1, rate5, rate15, rate_mean }
    }
}

/// A read-only copy of a [`Timer`].
#[derive(Clone, Debug, PartialEq)]
pub struct TimerSnapshot {
    histogram: HistogramSnapshot,
    rate1: f64,
    rate5: f64,
    rate15: f64,
    rate_mean: f64,
}

impl TimerSnapshot {
    /// Gets the histogram portion of the snapshot.
    pub fn histogram(&self) -> &HistogramSnapshot {
        &self.histogram
    }

    /// Gets the one-minute moving average rate, per second.
    pub fn rate1(&self) -> f64 {
        self.rate1
    }

    /// Gets the five-minute moving average rate, per second.
    pub fn rate5(&self) -> f64 {
        self.rate5
    }

    /// Gets the fifteen-minute moving average rate, per second.
    pub fn rate15(&self) -> f64 {
        self.rate15
    }

    /// Gets the mean rate since creation, per second.
    pub fn rate_mean(&self) -> f64 {
        self.rate_mean
    }
}
