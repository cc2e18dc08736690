use std::{
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    sync::Arc,
    thread,
    time::Duration,
};

use ipnet::IpNet;
use proxy_metrics::{Metrics, Options};
use tokio::runtime;
use tracing::{error, warn};

use crate::{
    common::BuildError,
    http_listener::new_http_listener,
    producers::{spawn_producers, MemoryStats, Producer, RuntimeStats},
    profile::{ProfileEndpoints, Profiler},
    ExporterFuture,
};

/// Default address of the scrape endpoint.
pub const DEFAULT_LISTEN_ADDRESS: ([u8; 4], u16) = ([0, 0, 0, 0], 9911);

/// Default interval between two captures of the periodic producers.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Builder for creating and installing the HTTP exporter.
pub struct HttpExporterBuilder {
    listen_address: SocketAddr,
    allowed_addresses: Option<Vec<IpNet>>,
    enable_profile: bool,
    profiler: Option<Arc<dyn Profiler>>,
    refresh_interval: Duration,
    runtime_stats: bool,
    producers: Vec<Arc<dyn Producer>>,
}

impl HttpExporterBuilder {
    /// Creates a new [`HttpExporterBuilder`].
    ///
    /// Listens on `0.0.0.0:9911`, with profiling and producers disabled.
    pub fn new() -> Self {
        Self {
            listen_address: SocketAddr::from(DEFAULT_LISTEN_ADDRESS),
            allowed_addresses: None,
            enable_profile: false,
            profiler: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            runtime_stats: false,
            producers: Vec::new(),
        }
    }

    /// Creates a builder configured from `options`.
    ///
    /// The listen address is taken from [`Options::listener`]; a bare `:port` listens on all
    /// interfaces.  Runtime statistics are captured when `enable_runtime_metrics` is set, and
    /// process memory statistics when `enable_debug_gc_metrics` is set.
    ///
    /// ## Errors
    ///
    /// If the listener address cannot be parsed or resolved, an error variant will be returned.
    pub fn from_options(options: &Options) -> Result<Self, BuildError> {
        let mut builder = Self::new()
            .with_http_listener(parse_listen_address(&options.listener)?)
            .enable_profile(options.enable_profile);

        builder.runtime_stats = options.enable_runtime_metrics;
        if options.enable_debug_gc_metrics {
            if cfg!(target_os = "linux") {
                builder = builder.add_producer(MemoryStats::new());
            } else {
                warn!("memory statistics are only available on Linux");
            }
        }

        Ok(builder)
    }

    /// Configures the exporter to expose an HTTP listener at `addr`.
    #[must_use]
    pub fn with_http_listener(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.listen_address = addr.into();
        self
    }

    /// Adds an IP address or subnet to the allowlist for the scrape endpoint.
    ///
    /// A bare address such as `127.0.0.1` is treated as a single-host subnet.
    ///
    /// If a client makes a request and their IP is not present in the allowlist, either directly
    /// or within any of the allowed subnets, they will receive a 403 Forbidden response.
    ///
    /// Defaults to allowing all IPs.
    ///
    /// ## Errors
    ///
    /// If the given address cannot be parsed into an IP address or subnet, an error variant will be
    /// returned describing the error.
    pub fn add_allowed_address<A>(mut self, address: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        use std::str::FromStr;

        let address = address.as_ref();
        let address = IpNet::from_str(address)
            .or_else(|e| IpAddr::from_str(address).map(IpNet::from).map_err(|_| e))
            .map_err(|e| BuildError::InvalidAllowlistAddress(e.to_string()))?;
        self.allowed_addresses.get_or_insert(vec![]).push(address);

        Ok(self)
    }

    /// Enables or disables the profiling endpoints under `/debug/pprof`.
    #[must_use]
    pub fn enable_profile(mut self, enabled: bool) -> Self {
        self.enable_profile = enabled;
        self
    }

    /// Sets the profiler answering the profiling endpoints that need one.
    ///
    /// Has no effect unless profiling is enabled.
    #[must_use]
    pub fn with_profiler<P: Profiler>(mut self, profiler: P) -> Self {
        self.profiler = Some(Arc::new(profiler));
        self
    }

    /// Sets the interval between two captures of the periodic producers.
    ///
    /// Defaults to 5 seconds.
    ///
    /// ## Errors
    ///
    /// If `interval` is zero, an error variant will be returned.
    pub fn set_refresh_interval(mut self, interval: Duration) -> Result<Self, BuildError> {
        if interval.is_zero() {
            return Err(BuildError::ZeroRefreshInterval);
        }

        self.refresh_interval = interval;
        Ok(self)
    }

    /// Adds a producer to be captured once per refresh interval.
    #[must_use]
    pub fn add_producer<P: Producer>(mut self, producer: P) -> Self {
        self.producers.push(Arc::new(producer));
        self
    }

    /// Gets the address the exporter will listen on.
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Builds the exporter and starts the periodic producers.
    ///
    /// The producers are spawned immediately onto the current Tokio runtime.  The returned future
    /// runs the HTTP listener and must be polled by the caller for scrapes to be answered.
    ///
    /// ## Errors
    ///
    /// If there is no current Tokio runtime, or the listener cannot bind to its address, an error
    /// variant will be returned describing the error.
    pub fn build(self, metrics: Metrics) -> Result<ExporterFuture, BuildError> {
        let handle =
            runtime::Handle::try_current().map_err(|e| BuildError::MissingRuntime(e.to_string()))?;

        let profile = self.enable_profile.then(|| ProfileEndpoints::new(self.profiler));
        let exporter = new_http_listener(
            metrics.clone(),
            self.listen_address,
            self.allowed_addresses,
            profile,
        )?;

        let mut producers = self.producers;
        if self.runtime_stats {
            producers.push(Arc::new(RuntimeStats::new(handle.clone())));
        }
        spawn_producers(&handle, &metrics, producers, self.refresh_interval);

        Ok(exporter)
    }

    /// Builds the exporter and runs it in the background.
    ///
    /// If called from within a Tokio runtime, the exporter is spawned onto that runtime.
    /// Otherwise, a new single-threaded runtime is created on a background thread, and the
    /// exporter is spawned there.
    ///
    /// ## Errors
    ///
    /// If there is an error while building the exporter, or creating the background runtime, an
    /// error variant will be returned describing the error.
    pub fn install(self, metrics: Metrics) -> Result<(), BuildError> {
        if let Ok(handle) = runtime::Handle::try_current() {
            let exporter = {
                let _g = handle.enter();
                self.build(metrics)?
            };

            handle.spawn(run_exporter(exporter));
        } else {
            let runtime = runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

            let exporter = {
                let _g = runtime.enter();
                self.build(metrics)?
            };

            thread::Builder::new()
                .name("proxy-metrics-exporter-http".to_string())
                .spawn(move || runtime.block_on(run_exporter(exporter)))
                .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;
        }

        Ok(())
    }
}

impl Default for HttpExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_exporter(exporter: ExporterFuture) {
    if let Err(e) = exporter.await {
        error!(error = %e, "metrics listener stopped");
    }
}

/// Parses a listener address such as `:9911`, `127.0.0.1:9911` or `localhost:9911`.
pub(crate) fn parse_listen_address(listener: &str) -> Result<SocketAddr, BuildError> {
    let normalized = match listener.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => listener.to_owned(),
    };

    normalized
        .to_socket_addrs()
        .map_err(|e| BuildError::InvalidListenAddress(format!("{}: {}", listener, e)))?
        .next()
        .ok_or_else(|| BuildError::InvalidListenAddress(listener.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use proxy_metrics::Options;

    use super::{parse_listen_address, HttpExporterBuilder};
    use crate::common::BuildError;

    #[test]
    fn test_parse_listen_address() {
        assert_eq!(
            parse_listen_address(":9911").expect("failed to parse"),
            SocketAddr::from(([0, 0, 0, 0], 9911))
        );
        assert_eq!(
            parse_listen_address("127.0.0.1:8080").expect("failed to parse"),
            SocketAddr::from(([127, 0, 0, 1], 8080))
        );
        assert!(matches!(
            parse_listen_address("not an address"),
            Err(BuildError::InvalidListenAddress(_))
        ));
        assert!(matches!(parse_listen_address(":port"), Err(BuildError::InvalidListenAddress(_))));
    }

    #[test]
    fn test_from_options() {
        let options = Options {
            listener: "127.0.0.1:9912".to_owned(),
            enable_profile: true,
            ..Options::default()
        };
        let builder = HttpExporterBuilder::from_options(&options).expect("failed to configure");

        assert_eq!(builder.listen_address(), SocketAddr::from(([127, 0, 0, 1], 9912)));
        assert!(builder.enable_profile);
        assert!(!builder.runtime_stats);
        assert!(builder.producers.is_empty());
    }

    #[test]
    fn test_allowlist_and_interval() {
        let builder = HttpExporterBuilder::new()
            .add_allowed_address("10.0.0.0/8")
            .and_then(|b| b.add_allowed_address("127.0.0.1"))
            .expect("failed to add allowed addresses");
        assert_eq!(builder.allowed_addresses.as_ref().map(Vec::len), Some(2));

        assert!(matches!(
            HttpExporterBuilder::new().add_allowed_address("10.0.0.0/33"),
            Err(BuildError::InvalidAllowlistAddress(_))
        ));
        assert!(matches!(
            HttpExporterBuilder::new().set_refresh_interval(Duration::ZERO),
            Err(BuildError::ZeroRefreshInterval)
        ));
    }

    #[test]
    fn test_build_requires_runtime() {
        let metrics = proxy_metrics::Metrics::void();
        let result = HttpExporterBuilder::new().build(metrics);
        assert!(matches!(result, Err(BuildError::MissingRuntime(_))));
    }
}
