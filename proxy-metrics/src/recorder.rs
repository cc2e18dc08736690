use std::{
    any::Any,
    fmt,
    sync::Arc,
    time::Instant,
};

use tracing::warn;

use crate::{
    error::UpdateError,
    histogram::Histogram,
    key::Key,
    kind::MetricKind,
    metric::{Foreign, Gauge, Metric},
    options::Options,
    registry::Registry,
    snapshot::Snapshot,
    storage::{AtomicStorage, Storage, VoidStorage},
    updater::{State, Update, Updater},
};

struct Inner {
    state: Arc<State>,
    updater: Updater,
    options: Options,
}

/// Handle used by the serving path to record metrics.
///
/// A `Metrics` handle is created once at startup and passed to every component that records
/// metrics.  Cloning it is cheap, and all clones share the same registry.
///
/// Every `measure_*` and `inc_*` method returns immediately: the metric key is built on the calling
/// thread, and the update itself is handed to a background worker.  Updates are best-effort; if the
/// update queue is full they are dropped, which only shows up in
/// [`dropped_updates`](Metrics::dropped_updates).
///
/// A handle created with [`Metrics::void`] accepts the exact same calls and discards them, so call
/// sites never need to check whether metrics are enabled.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

impl Metrics {
    /// Creates a handle that collects metrics according to `options`.
    pub fn new(options: Options) -> Self {
        let storage = AtomicStorage::new(options.reservoir_size);
        Self::with_storage(options, storage)
    }

    /// Creates a handle that discards everything recorded through it.
    pub fn void() -> Self {
        Self::with_storage(Options::default(), VoidStorage)
    }

    /// Creates a handle whose metrics are created by `storage`.
    pub fn with_storage<S>(options: Options, storage: S) -> Self
    where
        S: Storage + 'static,
    {
        let state = Arc::new(State { registry: Registry::new(), storage: Box::new(storage) });
        let updater = Updater::spawn(
            Arc::clone(&state),
            options.update_queue_capacity,
            options.update_workers,
        );

        Self { inner: Arc::new(Inner { state, updater, options }) }
    }

    /// Gets the options this handle was created with.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Gets the underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.state.registry
    }

    fn measure_since(&self, key: Key<'_>, start: Instant) {
        let elapsed = start.elapsed();
        let name = key.render(&self.inner.options.prefix);
        self.inner.updater.submit(Update::Timer { name, elapsed });
    }

    fn inc_counter(&self, key: Key<'_>) {
        let name = key.render(&self.inner.options.prefix);
        self.inner.updater.submit(Update::Counter { name, value: 1 });
    }

    /// Measures the time spent looking up a route.
    pub fn measure_route_lookup(&self, start: Instant) {
        self.measure_since(Key::RouteLookup, start);
    }

    /// Measures the time a single filter spent processing a request.
    pub fn measure_filter_request(&self, filter_name: &str, start: Instant) {
        self.measure_since(Key::FilterRequest { filter: filter_name }, start);
    }

    /// Measures the time all filters of a route spent processing a request.
    pub fn measure_all_filters_request(&self, route_id: &str, start: Instant) {
        self.measure_since(Key::AllFiltersRequest { route: route_id }, start);
    }

    /// Measures the time spent waiting on the backend of a route.
    pub fn measure_backend(&self, route_id: &str, start: Instant) {
        self.measure_since(Key::Backend { route: route_id }, start);
    }

    /// Measures the time spent waiting on a specific backend host.
    ///
    /// Does nothing unless [`Options::enable_backend_host_metrics`] is set.
    pub fn measure_backend_host(&self, backend_host: &str, start: Instant) {
        if self.inner.options.enable_backend_host_metrics {
            self.measure_since(Key::BackendHost { host: backend_host }, start);
        }
    }

    /// Measures the time a single filter spent processing a response.
    pub fn measure_filter_response(&self, filter_name: &str, start: Instant) {
        self.measure_since(Key::FilterResponse { filter: filter_name }, start);
    }

    /// Measures the time all filters of a route spent processing a response.
    pub fn measure_all_filters_response(&self, route_id: &str, start: Instant) {
        self.measure_since(Key::AllFiltersResponse { route: route_id }, start);
    }

    /// Measures the response time of a route, by status code and method.
    pub fn measure_response(&self, code: u16, method: &str, route_id: &str, start: Instant) {
        self.measure_since(Key::Response { code, method, route: route_id }, start);
    }

    /// Measures the total time spent serving a request, per route and per host.
    ///
    /// The per-route measurement only happens when [`Options::enable_serve_route_metrics`] is set,
    /// and the per-host one only when [`Options::enable_serve_host_metrics`] is set.
    pub fn measure_serve(
        &self,
        route_id: &str,
        host: &str,
        method: &str,
        code: u16,
        start: Instant,
    ) {
        if self.inner.options.enable_serve_route_metrics {
            self.measure_since(Key::ServeRoute { route: route_id, method, code }, start);
        }

        if self.inner.options.enable_serve_host_metrics {
            self.measure_since(Key::ServeHost { host, method, code }, start);
        }
    }

    /// Counts a request for which no route was found.
    pub fn inc_routing_failures(&self) {
        self.inc_counter(Key::RouteFailure);
    }

    /// Counts a failed backend request on a route.
    pub fn inc_errors_backend(&self, route_id: &str) {
        self.inc_counter(Key::ErrorsBackend { route: route_id });
    }

    /// Counts a failure while streaming a response on a route.
    pub fn inc_errors_streaming(&self, route_id: &str) {
        self.inc_counter(Key::ErrorsStreaming { route: route_id });
    }

    /// Gets or registers the gauge under `name`, with the configured prefix prepended.
    ///
    /// Intended for periodic producers, not for the serving path: the lookup happens synchronously.
    /// Returns `None` on a void handle, or if `name` is registered as another kind of metric.
    pub fn gauge(&self, name: &str) -> Option<Arc<Gauge>> {
        let name = self.prefixed(name);
        let state = &self.inner.state;
        match state.registry.get_or_register(&name, || state.storage.gauge()) {
            Metric::Gauge(gauge) => Some(gauge),
            other => unwrap_mismatch(name, MetricKind::Gauge, &other),
        }
    }

    /// Gets or registers the histogram under `name`, with the configured prefix prepended.
    ///
    /// Intended for periodic producers, not for the serving path: the lookup happens synchronously.
    /// Returns `None` on a void handle, or if `name` is registered as another kind of metric.
    pub fn histogram(&self, name: &str) -> Option<Arc<Histogram>> {
        let name = self.prefixed(name);
        let state = &self.inner.state;
        match state.registry.get_or_register(&name, || state.storage.histogram()) {
            Metric::Histogram(histogram) => Some(histogram),
            other => unwrap_mismatch(name, MetricKind::Histogram, &other),
        }
    }

    /// Registers an arbitrary value under `name`, with the configured prefix prepended.
    ///
    /// Such values have no statistical representation and are reported in the `unknown` family of
    /// a snapshot.  If `name` is already registered, the existing metric is returned and `value` is
    /// discarded.
    pub fn register_foreign<T>(&self, name: &str, value: T) -> Metric
    where
        T: Any + Send + Sync,
    {
        let name = self.prefixed(name);
        let state = &self.inner.state;
        state.registry.get_or_register(&name, || state.storage.foreign(Foreign::new(value)))
    }

    fn prefixed(&self, name: &str) -> String {
        format!("{}{}", self.inner.options.prefix, name)
    }

    /// Takes a snapshot of every metric registered so far.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::collect(self.registry())
    }

    /// Takes a snapshot of the metrics whose full name starts with `prefix`.
    pub fn snapshot_matching(&self, prefix: &str) -> Snapshot {
        Snapshot::collect_matching(self.registry(), prefix)
    }

    /// Blocks until every queued update has been applied.
    ///
    /// Updates submitted concurrently with the flush may extend the wait.  Never call this from the
    /// serving path.
    pub fn flush(&self) {
        self.inner.updater.flush();
    }

    /// Gets the number of updates dropped because the update queue was full or had no workers.
    pub fn dropped_updates(&self) -> u64 {
        self.inner.updater.dropped()
    }
}

fn unwrap_mismatch<T>(name: String, expected: MetricKind, found: &Metric) -> Option<T> {
    if found.kind() != MetricKind::Void {
        let e = UpdateError::KindMismatch { name, expected, found: found.kind() };
        warn!(error = %e, "cannot register metric");
    }
    None
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("options", &self.inner.options)
            .field("registered", &self.inner.state.registry.len())
            .field("dropped_updates", &self.dropped_updates())
            .finish()
    }
}
