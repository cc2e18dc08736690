use serde::Deserialize;

use crate::reservoir::DEFAULT_RESERVOIR_SIZE;

/// Default capacity of the update queue.
pub const DEFAULT_UPDATE_QUEUE_CAPACITY: usize = 8192;

/// Options for initializing metrics collection.
///
/// Options are set once at startup and never change afterwards.  They deserialize from any serde
/// format, with every missing field taking its default value.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Network address where the current metrics values can be pulled from.
    ///
    /// If empty, the collection of metrics is disabled altogether.
    pub listener: String,

    /// Common prefix for the keys of all collected metrics.
    ///
    /// Prepended verbatim, so it should carry its own trailing separator, such as `skipper.`.
    pub prefix: String,

    /// If set, process memory statistics are captured periodically in addition to the traffic
    /// metrics.
    pub enable_debug_gc_metrics: bool,

    /// If set, async runtime statistics are captured periodically in addition to the traffic metrics.
    pub enable_runtime_metrics: bool,

    /// If set, total response time is measured for each route, grouped by status and method.
    pub enable_serve_route_metrics: bool,

    /// If set, total response time is measured for each host, grouped by status and method.
    pub enable_serve_host_metrics: bool,

    /// If set, response time is measured for each backend host.
    pub enable_backend_host_metrics: bool,

    /// If set, profiling endpoints are exposed under `/debug/pprof` of the metrics listener.
    pub enable_profile: bool,

    /// Number of samples each histogram and timer keeps for percentile estimation.
    pub reservoir_size: usize,

    /// Maximum number of updates waiting to be applied.  Updates beyond this are dropped.
    pub update_queue_capacity: usize,

    /// Number of threads applying queued updates.
    pub update_workers: usize,
}

impl Options {
    /// Returns `true` if metrics collection is enabled, meaning a listener address is set.
    pub fn is_enabled(&self) -> bool {
        !self.listener.is_empty()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            listener: String::new(),
            prefix: String::new(),
            enable_debug_gc_metrics: false,
            enable_runtime_metrics: false,
            enable_serve_route_metrics: false,
            enable_serve_host_metrics: false,
            enable_backend_host_metrics: false,
            enable_profile: false,
            reservoir_size: DEFAULT_RESERVOIR_SIZE,
            update_queue_capacity: DEFAULT_UPDATE_QUEUE_CAPACITY,
            update_workers: 1,
        }
    }
}
