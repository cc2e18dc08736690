use thiserror::Error as ThisError;

use crate::kind::MetricKind;

/// Errors that could occur while applying an update to a registered metric.
///
/// These never reach the serving path: they are reported through `tracing` by whoever applied the
/// update.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum UpdateError {
    /// The name is already registered with a metric of a different kind.
    #[error("metric {name:?} is registered as a {found}, not a {expected}")]
    KindMismatch {
        /// Name of the metric.
        name: String,
        /// Kind the update needed.
        expected: MetricKind,
        /// Kind actually registered under the name.
        found: MetricKind,
    },
}
