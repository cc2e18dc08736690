//! An HTTP exporter for [`proxy_metrics`].
//!
//! The exporter serves point-in-time snapshots of a [`Metrics`] handle as JSON, and periodically
//! captures process statistics into the same handle.
//!
//! # Endpoints
//!
//! - `GET /metrics`: every metric, grouped by family
//! - `GET /metrics/<prefix>`: only the metrics whose name starts with `<prefix>`
//! - `/debug/pprof/...`: profiling endpoints, when enabled (see [`Profiler`])
//!
//! Other methods on the scrape endpoint are answered with `405 Method Not Allowed`, other paths
//! with `404 Not Found`.  Clients outside of a configured allowlist get `403 Forbidden`.
//!
//! # Usage
//!
//! [`init`] wires everything from [`Options`]: it hands out a void handle when no listener is
//! configured, and otherwise installs the exporter in the background.
//!
//! ```no_run
//! use proxy_metrics::Options;
//!
//! let metrics = proxy_metrics_exporter_http::init(Options {
//!     listener: ":9911".to_string(),
//!     enable_runtime_metrics: true,
//!     ..Options::default()
//! })
//! .expect("failed to start metrics listener");
//!
//! metrics.inc_routing_failures();
//! ```
//!
//! For more control, use [`HttpExporterBuilder`] directly.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::{future::Future, pin::Pin};

use proxy_metrics::{Metrics, Options};
use tracing::info;

mod builder;
pub use self::builder::{HttpExporterBuilder, DEFAULT_LISTEN_ADDRESS, DEFAULT_REFRESH_INTERVAL};

mod common;
pub use self::common::{BuildError, CaptureError, ExporterError};

mod http_listener;
pub use self::http_listener::METRICS_PATH;

mod producers;
pub use self::producers::{MemoryStats, Producer, RuntimeStats};

mod profile;
pub use self::profile::{ProfileEndpoint, Profiler, PROFILE_PATH};

/// Convenience type for Future implementing an exporter.
pub type ExporterFuture = Pin<Box<dyn Future<Output = Result<(), ExporterError>> + Send + 'static>>;

/// Creates the metrics handle described by `options`, serving it over HTTP if enabled.
///
/// When [`Options::listener`] is empty, metrics are disabled: a void handle is returned and
/// nothing is started.  Otherwise the exporter is installed in the background as described in
/// [`HttpExporterBuilder::install`].
///
/// ## Errors
///
/// If the listener address is invalid, or the exporter cannot be started, an error variant will
/// be returned describing the error.
pub fn init(options: Options) -> Result<Metrics, BuildError> {
    if !options.is_enabled() {
        info!("metrics are disabled");
        return Ok(Metrics::void());
    }

    let builder = HttpExporterBuilder::from_options(&options)?;
    let listen_address = builder.listen_address();
    let metrics = Metrics::new(options);

    builder.install(metrics.clone())?;
    info!("metrics listener on {}{}", listen_address, METRICS_PATH);

    Ok(metrics)
}
