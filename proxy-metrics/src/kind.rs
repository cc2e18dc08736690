use std::fmt;

/// Metric kind.
///
/// Defines the kind, or type, of a metric stored in the registry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum MetricKind {
    /// Counter type.
    Counter,
    /// Gauge type.
    Gauge,
    /// Histogram type.
    Histogram,
    /// Timer type.
    Timer,
    /// Inert stand-in handed out by the void storage.
    Void,
    /// Value registered by an external producer that has no statistical representation.
    Foreign,
}

impl MetricKind {
    /// Gets the name of this kind as used in log messages and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Timer => "timer",
            MetricKind::Void => "void",
            MetricKind::Foreign => "foreign",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
