//! Metric values as stored in the registry.
use std::{
    any::{type_name, Any},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{histogram::Histogram, kind::MetricKind, timer::Timer};

/// A registered metric.
///
/// Cloning a `Metric` is cheap and yields a handle to the same underlying storage.
#[derive(Clone)]
pub enum Metric {
    /// Monotonically increasing count.
    Counter(Arc<Counter>),
    /// Externally set point-in-time value.
    Gauge(Arc<Gauge>),
    /// Distribution of integer samples.
    Histogram(Arc<Histogram>),
    /// Distribution of durations, plus the rate at which they were recorded.
    Timer(Arc<Timer>),
    /// Inert stand-in: accepts every update and keeps nothing.
    Void,
    /// Opaque value registered by an external producer.
    Foreign(Arc<Foreign>),
}

impl Metric {
    /// Gets the kind of this metric.
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Timer(_) => MetricKind::Timer,
            Metric::Void => MetricKind::Void,
            Metric::Foreign(_) => MetricKind::Foreign,
        }
    }

    /// Returns `true` if both handles point at the same underlying storage.
    ///
    /// Void metrics carry no storage and are always considered identical.
    pub fn ptr_eq(&self, other: &Metric) -> bool {
        match (self, other) {
            (Metric::Counter(a), Metric::Counter(b)) => Arc::ptr_eq(a, b),
            (Metric::Gauge(a), Metric::Gauge(b)) => Arc::ptr_eq(a, b),
            (Metric::Histogram(a), Metric::Histogram(b)) => Arc::ptr_eq(a, b),
            (Metric::Timer(a), Metric::Timer(b)) => Arc::ptr_eq(a, b),
            (Metric::Void, Metric::Void) => true,
            (Metric::Foreign(a), Metric::Foreign(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Counter(c) => f.debug_tuple("Counter").field(&c.count()).finish(),
            Metric::Gauge(g) => f.debug_tuple("Gauge").field(&g.value()).finish(),
            Metric::Histogram(h) => f.debug_tuple("Histogram").field(&h.count()).finish(),
            Metric::Timer(t) => f.debug_tuple("Timer").field(&t.count()).finish(),
            Metric::Void => f.write_str("Void"),
            Metric::Foreign(v) => f.debug_tuple("Foreign").field(&v.type_name()).finish(),
        }
    }
}

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a zero-initialized counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by `value`.
    pub fn increment(&self, value: u64) {
        let _ = self.0.fetch_add(value, Ordering::Release);
    }

    /// Gets the current count.
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// A gauge holding a single floating-point value.
///
/// Gauges are set by periodic producers, not by the instrumentation API.
#[derive(Debug)]
pub struct Gauge(AtomicU64);

impl Gauge {
    /// Creates a gauge with a value of zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0f64.to_bits()))
    }

    /// Sets the gauge to `value`.
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Gets the current value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// An arbitrary value stored in the registry that is not one of the known metric kinds.
pub struct Foreign {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Foreign {
    /// Wraps `value`, remembering its type name for reporting.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self { type_name: type_name::<T>(), value: Box::new(value) }
    }

    /// Gets the Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Gets a reference to the wrapped value if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}
