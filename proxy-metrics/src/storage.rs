use std::sync::Arc;

use quanta::Clock;

use crate::{
    histogram::Histogram,
    metric::{Counter, Foreign, Gauge, Metric},
    reservoir::DEFAULT_RESERVOIR_SIZE,
    timer::Timer,
};

/// Defines how metrics are created when a name is first registered.
pub trait Storage: Send + Sync {
    /// Creates an empty counter.
    fn counter(&self) -> Metric;

    /// Creates an empty gauge.
    fn gauge(&self) -> Metric;

    /// Creates an empty histogram.
    fn histogram(&self) -> Metric;

    /// Creates an empty timer.
    fn timer(&self) -> Metric;

    /// Wraps a value registered by an external producer.
    fn foreign(&self, value: Foreign) -> Metric {
        Metric::Foreign(Arc::new(value))
    }
}

/// Atomic metric storage.
///
/// Counters and gauges are single atomics, histograms and timers sample into a uniform reservoir of
/// `reservoir_size` values.
pub struct AtomicStorage {
    reservoir_size: usize,
    clock: Clock,
}

impl AtomicStorage {
    /// Creates a new `AtomicStorage` whose histograms and timers keep `reservoir_size` samples.
    pub fn new(reservoir_size: usize) -> Self {
        Self::with_clock(reservoir_size, Clock::new())
    }

    /// Creates a new `AtomicStorage` whose timers measure rates against `clock`.
    pub fn with_clock(reservoir_size: usize, clock: Clock) -> Self {
        Self { reservoir_size, clock }
    }
}

impl Default for AtomicStorage {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVOIR_SIZE)
    }
}

impl Storage for AtomicStorage {
    fn counter(&self) -> Metric {
        Metric::Counter(Arc::new(Counter::new()))
    }

    fn gauge(&self) -> Metric {
        Metric::Gauge(Arc::new(Gauge::new()))
    }

    fn histogram(&self) -> Metric {
        Metric::Histogram(Arc::new(Histogram::new(self.reservoir_size)))
    }

    fn timer(&self) -> Metric {
        Metric::Timer(Arc::new(Timer::new(self.reservoir_size, self.clock.clone())))
    }
}

/// Storage that only hands out [`Metric::Void`].
///
/// Updates applied to void metrics are discarded, and void metrics never appear in a snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidStorage;

impl Storage for VoidStorage {
    fn counter(&self) -> Metric {
        Metric::Void
    }

    fn gauge(&self) -> Metric {
        Metric::Void
    }

    fn histogram(&self) -> Metric {
        Metric::Void
    }

    fn timer(&self) -> Metric {
        Metric::Void
    }

    fn foreign(&self, _value: Foreign) -> Metric {
        Metric::Void
    }
}
