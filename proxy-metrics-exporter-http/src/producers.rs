//! Periodic producers of process statistics.
//!
//! A [`Producer`] is polled once per refresh interval and writes what it observes into gauges and
//! histograms of the [`Metrics`] handle it is given.
use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use proxy_metrics::Metrics;
use tokio::{runtime::Handle, time::MissedTickBehavior};
use tracing::warn;

use crate::common::CaptureError;

/// Captures statistics into a metrics handle.
pub trait Producer: Send + Sync + 'static {
    /// Name used when reporting capture failures.
    fn name(&self) -> &'static str;

    /// Captures the current statistics into `metrics`.
    fn capture(&self, metrics: &Metrics) -> Result<(), CaptureError>;
}

/// Statistics of a Tokio runtime.
///
/// - `runtime.Tokio.NumWorkers`: gauge of worker threads
/// - `runtime.Tokio.NumAliveTasks`: gauge of tasks that have not completed yet
/// - `runtime.Tokio.GlobalQueueDepth`: histogram of tasks waiting in the global queue
pub struct RuntimeStats {
    handle: Handle,
}

impl RuntimeStats {
    /// Creates a producer observing the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Producer for RuntimeStats {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn capture(&self, metrics: &Metrics) -> Result<(), CaptureError> {
        let stats = self.handle.metrics();

        if let Some(gauge) = metrics.gauge("runtime.Tokio.NumWorkers") {
            gauge.set(stats.num_workers() as f64);
        }
        if let Some(gauge) = metrics.gauge("runtime.Tokio.NumAliveTasks") {
            gauge.set(stats.num_alive_tasks() as f64);
        }
        if let Some(histogram) = metrics.histogram("runtime.Tokio.GlobalQueueDepth") {
            histogram.update(i64::try_from(stats.global_queue_depth()).unwrap_or(i64::MAX));
        }

        Ok(())
    }
}

/// Memory statistics of the current process, read from `/proc/self/status`.
///
/// - `debug.Memory.ResidentBytes`: gauge of the resident set size
/// - `debug.Memory.VirtualBytes`: gauge of the virtual memory size
pub struct MemoryStats {
    path: PathBuf,
}

impl MemoryStats {
    /// Creates a producer reading the status file of the current process.
    pub fn new() -> Self {
        Self::from_path("/proc/self/status")
    }

    /// Creates a producer reading a status file at `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MemoryStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer for MemoryStats {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capture(&self, metrics: &Metrics) -> Result<(), CaptureError> {
        let status = fs::read_to_string(&self.path)?;
        let usage = MemoryUsage::parse(&status)?;

        if let Some(gauge) = metrics.gauge("debug.Memory.ResidentBytes") {
            gauge.set(usage.resident_bytes as f64);
        }
        if let Some(gauge) = metrics.gauge("debug.Memory.VirtualBytes") {
            gauge.set(usage.virtual_bytes as f64);
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct MemoryUsage {
    resident_bytes: u64,
    virtual_bytes: u64,
}

impl MemoryUsage {
    fn parse(status: &str) -> Result<Self, CaptureError> {
        let mut resident = None;
        let mut virt = None;

        for line in status.lines() {
            if let Some(value) = line.strip_prefix("VmRSS:") {
                resident = Some(parse_kilobytes(value)?);
            } else if let Some(value) = line.strip_prefix("VmSize:") {
                virt = Some(parse_kilobytes(value)?);
            }
        }

        match (resident, virt) {
            (Some(resident_bytes), Some(virtual_bytes)) => {
                Ok(Self { resident_bytes, virtual_bytes })
            }
            _ => Err(CaptureError::Malformed("missing VmRSS or VmSize".to_owned())),
        }
    }
}

// "   1234 kB"
fn parse_kilobytes(value: &str) -> Result<u64, CaptureError> {
    let value = value.trim();
    let digits = value.strip_suffix("kB").unwrap_or(value).trim();
    digits
        .parse::<u64>()
        .map(|kb| kb.saturating_mul(1024))
        .map_err(|e| CaptureError::Malformed(format!("{:?}: {}", value, e)))
}

/// Polls every producer on `handle` once per `interval`, for as long as the runtime lives.
pub(crate) fn spawn_producers(
    handle: &Handle,
    metrics: &Metrics,
    producers: Vec<Arc<dyn Producer>>,
    interval: Duration,
) {
    for producer in producers {
        let metrics = metrics.clone();
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = producer.capture(&metrics) {
                    warn!(producer = producer.name(), error = %e, "failed to capture statistics");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use proxy_metrics::{Metrics, Options};

    use super::{parse_kilobytes, MemoryStats, MemoryUsage, Producer, RuntimeStats};
    use crate::common::CaptureError;

    const STATUS: &str = "Name:\tproxy\n\
                          VmPeak:\t  20000 kB\n\
                          VmSize:\t  16384 kB\n\
                          VmRSS:\t   2048 kB\n";

    fn metrics() -> Metrics {
        Metrics::new(Options { listener: ":9911".to_owned(), ..Options::default() })
    }

    #[test]
    fn test_parse_memory_usage() {
        let usage = MemoryUsage::parse(STATUS).expect("failed to parse status");
        assert_eq!(
            usage,
            MemoryUsage { resident_bytes: 2048 * 1024, virtual_bytes: 16384 * 1024 }
        );
    }

    #[test]
    fn test_parse_memory_usage_missing_fields() {
        let result = MemoryUsage::parse("Name:\tproxy\nVmRSS:\t 12 kB\n");
        assert!(matches!(result, Err(CaptureError::Malformed(_))));

        assert!(matches!(parse_kilobytes(" lots kB"), Err(CaptureError::Malformed(_))));
        assert_eq!(parse_kilobytes("\t 3 kB").expect("failed to parse"), 3072);
    }

    #[test]
    fn test_memory_stats_missing_file() {
        let stats = MemoryStats::from_path("/nonexistent/proxy-metrics/status");
        assert!(matches!(stats.capture(&metrics()), Err(CaptureError::Io(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_stats_capture() {
        let metrics = metrics();
        MemoryStats::new().capture(&metrics).expect("failed to capture memory statistics");

        let snapshot = metrics.snapshot();
        assert!(snapshot.gauges["debug.Memory.ResidentBytes"].value > 0.0);
        assert!(snapshot.gauges["debug.Memory.VirtualBytes"].value > 0.0);
    }

    #[test]
    fn test_runtime_stats_capture() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap_or_else(|e| panic!("failed to create test runtime: {:?}", e));

        let metrics = metrics();
        RuntimeStats::new(runtime.handle().clone())
            .capture(&metrics)
            .expect("failed to capture runtime statistics");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.gauges["runtime.Tokio.NumWorkers"].value, 1.0);
        assert_eq!(snapshot.gauges["runtime.Tokio.NumAliveTasks"].value, 0.0);
        assert_eq!(snapshot.histograms["runtime.Tokio.GlobalQueueDepth"].count, 1);
    }
}
