//! Point-in-time views of a registry, and their JSON rendering.
//!
//! Every registered metric is classified into a family by its kind and reduced to a map of
//! statistics.  The rendered document groups metrics as `family -> name -> statistics`:
//!
//! ```json
//! {
//!   "gauges":     {"<name>": {"value": 1.5}},
//!   "histograms": {"<name>": {"count": 3, "min": 1, "max": 3, "mean": 2.0, "stddev": 0.81,
//!                             "median": 2.0, "75%": 3.0, "95%": 3.0, "99%": 3.0, "99.9%": 3.0}},
//!   "timers":     {"<name>": {"...histogram fields...": 0,
//!                             "1m.rate": 0.2, "5m.rate": 0.2, "15m.rate": 0.2, "mean.rate": 0.1}},
//!   "counters":   {"<name>": {"count": 1}}
//! }
//! ```
//!
//! The four families are always present.  Metrics that cannot be described statistically are listed
//! under an additional `unknown` family, carrying an `error` string instead of numbers; that family
//! is omitted when empty.  Void metrics are skipped entirely.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    histogram::{HistogramSnapshot, REPORTED_QUANTILES},
    metric::Metric,
    registry::Registry,
    timer::TimerSnapshot,
};

/// Statistics of a gauge.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GaugeStatistics {
    /// Current value.
    pub value: f64,
}

/// Statistics of a histogram.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramStatistics {
    /// Number of recorded values.
    pub count: u64,
    /// Smallest recorded value.
    pub min: i64,
    /// Largest recorded value.
    pub max: i64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// 50th percentile.
    pub median: f64,
    /// 75th percentile.
    #[serde(rename = "75%")]
    pub p75: f64,
    /// 95th percentile.
    #[serde(rename = "95%")]
    pub p95: f64,
    /// 99th percentile.
    #[serde(rename = "99%")]
    pub p99: f64,
    /// 99.9th percentile.
    #[serde(rename = "99.9%")]
    pub p999: f64,
}

impl From<&HistogramSnapshot> for HistogramStatistics {
    fn from(h: &HistogramSnapshot) -> Self {
        let ps = h.percentiles(&REPORTED_QUANTILES);
        Self {
            count: h.count(),
            min: h.min(),
            max: h.max(),
            mean: h.mean(),
            stddev: h.stddev(),
            median: ps[0],
            p75: ps[1],
            p95: ps[2],
            p99: ps[3],
            p999: ps[4],
        }
    }
}

/// Statistics of a timer.  Durations are in nanoseconds, rates are per second.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimerStatistics {
    /// Distribution of the recorded durations.
    #[serde(flatten)]
    pub histogram: HistogramStatistics,
    /// One-minute moving average rate.
    #[serde(rename = "1m.rate")]
    pub rate1: f64,
    /// Five-minute moving average rate.
    #[serde(rename = "5m.rate")]
    pub rate5: f64,
    /// Fifteen-minute moving average rate.
    #[serde(rename = "15m.rate")]
    pub rate15: f64,
    /// Mean rate since creation.
    #[serde(rename = "mean.rate")]
    pub rate_mean: f64,
}

impl From<&TimerSnapshot> for TimerStatistics {
    fn from(t: &TimerSnapshot) -> Self {
        Self {
            histogram: HistogramStatistics::from(t.histogram()),
            rate1: t.rate1(),
            rate5: t.rate5(),
            rate15: t.rate15(),
            rate_mean: t.rate_mean(),
        }
    }
}

/// Statistics of a counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterStatistics {
    /// Current count.
    pub count: u64,
}

/// Placeholder for a metric that could not be described.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnknownStatistics {
    /// Why the metric could not be described.
    pub error: String,
}

/// A point-in-time snapshot of every metric in a registry, grouped by family.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Gauges, by name.
    pub gauges: BTreeMap<String, GaugeStatistics>,
    /// Histograms, by name.
    pub histograms: BTreeMap<String, HistogramStatistics>,
    /// Timers, by name.
    pub timers: BTreeMap<String, TimerStatistics>,
    /// Counters, by name.
    pub counters: BTreeMap<String, CounterStatistics>,
    /// Metrics that could not be classified, by name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unknown: BTreeMap<String, UnknownStatistics>,
}

impl Snapshot {
    /// Takes a snapshot of every metric in `registry`.
    pub fn collect(registry: &Registry) -> Self {
        Self::collect_matching(registry, "")
    }

    /// Takes a snapshot of the metrics in `registry` whose name starts with `prefix`.
    pub fn collect_matching(registry: &Registry, prefix: &str) -> Self {
        let mut snapshot = Snapshot::default();
        registry.visit(|name, metric| {
            if name.starts_with(prefix) {
                snapshot.record(name, metric);
            }
        });
        snapshot
    }

    fn record(&mut self, name: &str, metric: &Metric) {
        let name = name.to_owned();
        match metric {
            Metric::Gauge(g) => {
                self.gauges.insert(name, GaugeStatistics { value: g.value() });
            }
            Metric::Histogram(h) => {
                self.histograms.insert(name, HistogramStatistics::from(&h.snapshot()));
            }
            Metric::Timer(t) => {
                self.timers.insert(name, TimerStatistics::from(&t.snapshot()));
            }
            Metric::Counter(c) => {
                self.counters.insert(name, CounterStatistics { count: c.count() });
            }
            Metric::Foreign(v) => {
                let error = format!("unknown metrics type {}", v.type_name());
                self.unknown.insert(name, UnknownStatistics { error });
            }
            Metric::Void => {}
        }
    }

    /// Returns `true` if no metric was captured in any family.
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
            && self.histograms.is_empty()
            && self.timers.is_empty()
            && self.counters.is_empty()
            && self.unknown.is_empty()
    }

    /// Renders the snapshot as a compact JSON document.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
