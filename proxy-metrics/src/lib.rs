//! Latency and count instrumentation for request-serving components.
//!
//! `proxy-metrics` records timings and counts for dynamically named operations of a proxy (route
//! lookups, filter execution, backend calls, responses) and exposes them as a point-in-time
//! [`Snapshot`] for pull-based collection.
//!
//! # Overview
//!
//! - [`Key`] turns an event plus its identity (route, filter, host, method, status code) into a
//!   canonical metric name, sanitizing hosts and methods on the way.
//! - [`Registry`] maps names to metrics, creating each metric exactly once on first access.
//! - [`Storage`] decides what gets created: [`AtomicStorage`] for real metrics, [`VoidStorage`] for
//!   inert stand-ins.
//! - [`Metrics`] is the handle the serving path calls into.  It never blocks: updates are queued and
//!   applied by background workers.
//! - [`Snapshot`] walks the registry, classifies every metric and renders the JSON document.
//!
//! # Usage
//!
//! ```
//! use std::time::Instant;
//!
//! use proxy_metrics::{Metrics, Options};
//!
//! let metrics = Metrics::new(Options {
//!     listener: ":9911".to_string(),
//!     enable_backend_host_metrics: true,
//!     ..Options::default()
//! });
//!
//! let start = Instant::now();
//! // ... look up the route ...
//! metrics.measure_route_lookup(start);
//! metrics.measure_backend_host("10.0.0.1:8080", start);
//! metrics.inc_errors_backend("my_route");
//!
//! metrics.flush();
//! let snapshot = metrics.snapshot();
//! assert!(snapshot.timers.contains_key("backendhost.10_0_0_1__8080"));
//! assert_eq!(snapshot.counters["errors.backend.my_route"].count, 1);
//! ```
//!
//! When metrics are disabled, hand out [`Metrics::void`] instead: every call is accepted and
//! discarded, and snapshots stay empty.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
pub use self::error::UpdateError;

mod histogram;
pub use self::histogram::{Histogram, HistogramSnapshot, REPORTED_QUANTILES};

mod key;
pub use self::key::{host_for_key, measured_method, Key, UNKNOWN_METHOD};

mod kind;
pub use self::kind::MetricKind;

mod meter;
pub use self::meter::{Meter, TICK_INTERVAL};

mod metric;
pub use self::metric::{Counter, Foreign, Gauge, Metric};

mod options;
pub use self::options::{Options, DEFAULT_UPDATE_QUEUE_CAPACITY};

mod recorder;
pub use self::recorder::Metrics;

mod registry;
pub use self::registry::Registry;

mod reservoir;
pub use self::reservoir::{UniformReservoir, DEFAULT_RESERVOIR_SIZE};

mod snapshot;
pub use self::snapshot::{
    CounterStatistics, GaugeStatistics, HistogramStatistics, Snapshot, TimerStatistics,
    UnknownStatistics,
};

mod storage;
pub use self::storage::{AtomicStorage, Storage, VoidStorage};

mod timer;
pub use self::timer::{Timer, TimerSnapshot};

mod updater;
