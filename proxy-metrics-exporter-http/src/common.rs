use std::io;

use thiserror::Error as ThisError;

/// Errors that could occur while building or installing the exporter.
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// The listener address could not be parsed or resolved.
    #[error("invalid listener address {0}")]
    InvalidListenAddress(String),

    /// The given address could not be parsed successfully as an IP address/subnet.
    #[error("invalid allowed address/subnet: {0}")]
    InvalidAllowlistAddress(String),

    /// The refresh interval for periodic producers was zero.
    #[error("refresh interval cannot be zero")]
    ZeroRefreshInterval,

    /// No Tokio runtime was available to spawn the exporter onto.
    #[error("no Tokio runtime available: {0}")]
    MissingRuntime(String),

    /// Creating the networking event loop did not succeed.
    #[error("failed to spawn Tokio runtime for endpoint: {0}")]
    FailedToCreateRuntime(String),

    /// Binding/listening to the given address did not succeed.
    #[error("failed to create HTTP listener: {0}")]
    FailedToCreateHTTPListener(String),
}

/// Errors that could occur while a producer captures statistics.
#[derive(Debug, ThisError)]
pub enum CaptureError {
    /// Reading the statistics source failed.
    #[error("failed to read statistics: {0}")]
    Io(#[from] io::Error),

    /// The statistics source did not have the expected shape.
    #[error("malformed statistics: {0}")]
    Malformed(String),
}

/// Errors that stop a running exporter.
#[derive(Debug, ThisError)]
pub enum ExporterError {
    /// The bound listener could not be registered with the runtime.
    #[error("failed to register HTTP listener: {0}")]
    HttpListener(io::Error),
}
